//! Broker payload for confirmed donations.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Broker topic carrying [`DonationEvent`] payloads.
pub const DONATIONS_TOPIC: &str = "donations:new";

/// Value of the `type` field of every [`DonationEvent`].
pub const NEW_DONATION_EVENT_TYPE: &str = "new_donation";

/// Emitted once per donation transition to `completed`.
///
/// ```json
/// {"type":"new_donation","id":"…","donor_name":"Budi","message":"semangat!","amount":50000,"paid_at":"2024-01-15T10:30:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: Uuid,
    pub donor_name: String,
    #[serde(default)]
    pub message: String,
    /// Amount in minor currency units.
    pub amount: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub paid_at: OffsetDateTime,
}

impl DonationEvent {
    pub fn new(
        id: Uuid,
        donor_name: impl Into<String>,
        message: impl Into<String>,
        amount: i64,
        paid_at: OffsetDateTime,
    ) -> Self {
        Self {
            event_type: NEW_DONATION_EVENT_TYPE.to_string(),
            id,
            donor_name: donor_name.into(),
            message: message.into(),
            amount,
            paid_at,
        }
    }
}
