//! Donation feed consumer (overlay widget or admin dashboard → ReveeGate server).

use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

use super::ClientError;
use crate::objects::ws::{DonationData, WsClientMessage, WsEnvelope, WsMessageKind};

/// Opens donation feed sessions against a ReveeGate server.
///
/// `base_url` uses the `ws://` or `wss://` scheme.
#[derive(Debug, Clone)]
pub struct FeedClient {
    base_url: Url,
}

impl FeedClient {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// `GET /ws/overlay?token=…`
    pub async fn connect_overlay(&self, token: &str) -> Result<FeedSession, ClientError> {
        self.connect("/ws/overlay", token).await
    }

    /// `GET /ws/admin?token=…`
    pub async fn connect_admin(&self, jwt: &str) -> Result<FeedSession, ClientError> {
        self.connect("/ws/admin", jwt).await
    }

    async fn connect(&self, path: &str, token: &str) -> Result<FeedSession, ClientError> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().append_pair("token", token);

        let (stream, _) = connect_async(url.as_str()).await?;
        Ok(FeedSession {
            stream,
            pending: VecDeque::new(),
        })
    }
}

/// A live feed connection.
///
/// Frames that carry several newline-separated envelopes are split and
/// yielded one envelope at a time.
pub struct FeedSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending: VecDeque<WsEnvelope>,
}

impl FeedSession {
    /// Next envelope, or `None` once the server closed the connection.
    pub async fn next_envelope(&mut self) -> Result<Option<WsEnvelope>, ClientError> {
        loop {
            if let Some(envelope) = self.pending.pop_front() {
                return Ok(Some(envelope));
            }
            match self.stream.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => {
                    for line in text.split('\n').filter(|line| !line.trim().is_empty()) {
                        self.pending.push_back(serde_json::from_str(line)?);
                    }
                }
                Some(Ok(_)) => {}
            }
        }
    }

    /// Skip envelopes until the next `donation` arrives.
    pub async fn next_donation(&mut self) -> Result<Option<DonationData>, ClientError> {
        while let Some(envelope) = self.next_envelope().await? {
            if envelope.kind == WsMessageKind::Donation {
                let data = envelope.data.ok_or(ClientError::MissingData)?;
                return Ok(Some(serde_json::from_value(data)?));
            }
        }
        Ok(None)
    }

    pub async fn send(&mut self, message: &WsClientMessage) -> Result<(), ClientError> {
        let json = serde_json::to_string(message)?;
        self.stream.send(Message::Text(json)).await?;
        Ok(())
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.send(&WsClientMessage::ping()).await
    }

    pub async fn subscribe(&mut self) -> Result<(), ClientError> {
        self.send(&WsClientMessage::subscribe()).await
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
