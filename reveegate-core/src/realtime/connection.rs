//! Per-connection protocol, independent of the socket implementation.
//!
//! A connection is split in two halves that run concurrently:
//!
//! - [`ConnectionReader`] interprets inbound text frames and queues replies.
//! - [`ConnectionWriter`] drains the outbound queue into coalesced frames.
//!
//! The server drives both halves from its WebSocket read/write loops.

use std::time::Duration;

use reveegate_sdk::objects::ws::WsEnvelope;
use reveegate_sdk::objects::{WsClientCommand, WsClientMessage};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::hub::{HubError, HubHandle};
use crate::events::{OutboundMessage, OutboundReceiver, WeakOutboundSender, outbound_channel};

/// Timing and sizing of feed connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Time allowed to write a frame.
    pub write_wait: Duration,
    /// Time allowed between heartbeat responses.
    pub pong_wait: Duration,
    /// Heartbeat interval; must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Largest inbound frame in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity.
    pub send_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(60), 4096, 256)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionConfigError {
    #[error("ping period {ping:?} must be shorter than pong wait {pong:?}")]
    PingNotShorterThanPong { ping: Duration, pong: Duration },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl ConnectionConfig {
    /// Build a config whose ping period is nine tenths of `pong_wait`.
    pub fn new(
        write_wait: Duration,
        pong_wait: Duration,
        max_message_size: usize,
        send_buffer: usize,
    ) -> Self {
        Self {
            write_wait,
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size,
            send_buffer,
        }
    }

    pub fn validate(&self) -> Result<(), ConnectionConfigError> {
        if self.pong_wait.is_zero() {
            return Err(ConnectionConfigError::Zero("pong_wait"));
        }
        if self.write_wait.is_zero() {
            return Err(ConnectionConfigError::Zero("write_wait"));
        }
        if self.max_message_size == 0 {
            return Err(ConnectionConfigError::Zero("max_message_size"));
        }
        if self.send_buffer == 0 {
            return Err(ConnectionConfigError::Zero("send_buffer"));
        }
        if self.ping_period.is_zero() || self.ping_period >= self.pong_wait {
            return Err(ConnectionConfigError::PingNotShorterThanPong {
                ping: self.ping_period,
                pong: self.pong_wait,
            });
        }
        Ok(())
    }
}

/// Reply queued for an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundReply {
    Pong,
    Ack,
    Error,
    Ignored,
}

/// Create a connection on `channel` and register it with the hub.
///
/// The `welcome` envelope is queued before registration so it is always the
/// first frame the client sees.
pub async fn open_connection(
    hub: &HubHandle,
    channel: String,
    config: &ConnectionConfig,
) -> Result<(ConnectionReader, ConnectionWriter), HubError> {
    let id = Uuid::new_v4();
    let (tx, rx) = outbound_channel(config.send_buffer);

    let welcome: OutboundMessage = WsEnvelope::welcome(id, channel.clone()).to_json()?.into();
    // The queue is empty and has room for at least one message.
    let _ = tx.try_send(welcome);

    let reply = tx.downgrade();
    hub.register(id, channel.clone(), tx).await?;

    Ok((
        ConnectionReader {
            id,
            channel: channel.clone(),
            reply,
        },
        ConnectionWriter { id, channel, rx },
    ))
}

pub struct ConnectionReader {
    id: Uuid,
    channel: String,
    reply: WeakOutboundSender,
}

impl ConnectionReader {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Interpret one inbound text frame and queue the reply, if any.
    pub fn handle_text(&self, text: &str) -> InboundReply {
        let (reply, json) = match serde_json::from_str::<WsClientMessage>(text) {
            Err(e) => {
                debug!(client_id = %self.id, error = %e, "Invalid inbound message");
                (
                    InboundReply::Error,
                    WsEnvelope::error("Invalid message format").to_json(),
                )
            }
            Ok(message) => match message.command() {
                WsClientCommand::Ping => (InboundReply::Pong, WsEnvelope::pong().to_json()),
                WsClientCommand::Subscribe => {
                    (InboundReply::Ack, WsEnvelope::ack("subscribed").to_json())
                }
                WsClientCommand::Unknown => {
                    debug!(client_id = %self.id, kind = %message.kind, "Unknown message type");
                    return InboundReply::Ignored;
                }
            },
        };

        match json {
            Ok(json) => self.enqueue(json.into()),
            Err(e) => debug!(client_id = %self.id, error = %e, "Failed to encode reply"),
        }
        reply
    }

    /// Queue a reply without blocking. Dropped when the queue is full or the
    /// hub already released the connection.
    fn enqueue(&self, message: OutboundMessage) {
        if let Some(tx) = self.reply.upgrade()
            && tx.try_send(message).is_err()
        {
            debug!(client_id = %self.id, "Reply dropped, outbound queue unavailable");
        }
    }
}

pub struct ConnectionWriter {
    id: Uuid,
    channel: String,
    rx: OutboundReceiver,
}

impl ConnectionWriter {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next frame.
    ///
    /// Every message queued since the last write is joined with `\n` into one
    /// frame. Returns `None` once the hub closed the queue.
    pub async fn next_frame(&mut self) -> Option<String> {
        let first = self.rx.recv().await?;
        let mut frame = String::from(&*first);
        while let Ok(next) = self.rx.try_recv() {
            frame.push('\n');
            frame.push_str(&next);
        }
        Some(frame)
    }
}
