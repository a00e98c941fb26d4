pub mod admin;
pub mod donation;
pub mod webhook;
pub mod ws;

pub use admin::{
    HubStats, MIN_RECONCILE_REASON_LEN, ManualStatus, ReconcileRequest, ReconcileResponse,
    SyncResponse,
};
pub use donation::{DONATIONS_TOPIC, DonationEvent, NEW_DONATION_EVENT_TYPE};
pub use webhook::{MidtransNotification, WebhookAck, XenditCallback};
pub use ws::{WsClientCommand, WsClientMessage, WsCloseCode, WsEnvelope, WsMessageKind};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported payment providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Midtrans,
    Xendit,
}

impl Provider {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Provider::Midtrans => "midtrans",
            Provider::Xendit => "xendit",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status as exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Expired,
    Failed,
    Refunded,
}

/// Donation status as exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Completed,
    Expired,
    Failed,
    Cancelled,
}
