//! WebSocket message types for the donation feed.
//!
//! Overlay clients connect to `GET /ws/overlay?token=…`, admin clients to
//! `GET /ws/admin` with a bearer JWT. Both receive [`WsEnvelope`] frames.
//!
//! # Protocol
//!
//! 1. The server sends a `welcome` envelope carrying the connection id and
//!    channel name right after the upgrade.
//! 2. `donation` envelopes follow whenever a donation is confirmed.
//! 3. The client may send [`WsClientMessage`] commands: `ping` is answered
//!    with `pong`, `subscribe` with `ack`. Anything else is ignored.
//! 4. A single text frame may carry several envelopes separated by `\n`
//!    when the server coalesces queued messages.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::donation::DonationEvent;

/// Discriminator of a server-to-client envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageKind {
    Welcome,
    Pong,
    Ack,
    Error,
    Donation,
    #[serde(other)]
    Unknown,
}

/// Server-to-client envelope.
///
/// ```json
/// {"type":"donation","data":{"id":"…","donor_name":"Budi","message":"","amount":50000,"paid_at":"…"},"timestamp":"2024-01-15T10:30:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsEnvelope<T = serde_json::Value> {
    #[serde(rename = "type")]
    pub kind: WsMessageKind,
    pub data: Option<T>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl<T: Serialize> WsEnvelope<T> {
    pub fn new(kind: WsMessageKind, data: Option<T>) -> Self {
        Self {
            kind,
            data,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `welcome` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeData {
    pub client_id: Uuid,
    pub channel: String,
    pub message: String,
}

/// `ack` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckData {
    pub action: String,
}

/// `error` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

/// `donation` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationData {
    pub id: Uuid,
    pub donor_name: String,
    pub message: String,
    pub amount: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub paid_at: OffsetDateTime,
}

impl From<&DonationEvent> for DonationData {
    fn from(event: &DonationEvent) -> Self {
        Self {
            id: event.id,
            donor_name: event.donor_name.clone(),
            message: event.message.clone(),
            amount: event.amount,
            paid_at: event.paid_at,
        }
    }
}

impl WsEnvelope<WelcomeData> {
    pub fn welcome(client_id: Uuid, channel: impl Into<String>) -> Self {
        Self::new(
            WsMessageKind::Welcome,
            Some(WelcomeData {
                client_id,
                channel: channel.into(),
                message: "Connected to ReveeGate WebSocket".to_string(),
            }),
        )
    }
}

impl WsEnvelope<()> {
    pub fn pong() -> Self {
        Self::new(WsMessageKind::Pong, None)
    }
}

impl WsEnvelope<AckData> {
    pub fn ack(action: impl Into<String>) -> Self {
        Self::new(
            WsMessageKind::Ack,
            Some(AckData {
                action: action.into(),
            }),
        )
    }
}

impl WsEnvelope<ErrorData> {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            WsMessageKind::Error,
            Some(ErrorData {
                message: message.into(),
            }),
        )
    }
}

impl WsEnvelope<DonationData> {
    pub fn donation(event: &DonationEvent) -> Self {
        Self::new(WsMessageKind::Donation, Some(event.into()))
    }
}

/// Client-to-server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Commands understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsClientCommand {
    Ping,
    Subscribe,
    Unknown,
}

impl WsClientMessage {
    pub fn ping() -> Self {
        Self {
            kind: "ping".to_string(),
            payload: None,
        }
    }

    pub fn subscribe() -> Self {
        Self {
            kind: "subscribe".to_string(),
            payload: None,
        }
    }

    pub fn command(&self) -> WsClientCommand {
        match self.kind.as_str() {
            "ping" => WsClientCommand::Ping,
            "subscribe" => WsClientCommand::Subscribe,
            _ => WsClientCommand::Unknown,
        }
    }
}

/// Well-known WebSocket close codes used by the donation feed.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;

    /// The server is going away (queue closed by the hub or shutdown).
    pub const GOING_AWAY: u16 = 1001;

    /// An inbound frame exceeded the maximum message size.
    pub const MESSAGE_TOO_BIG: u16 = 1009;

    /// An unexpected server-side error prevented the connection from
    /// continuing.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// The overlay token or admin JWT was rejected.
    pub const UNAUTHORIZED: u16 = 4001;
}
