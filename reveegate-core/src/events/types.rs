use std::sync::Arc;

use reveegate_sdk::objects::DonationEvent;
use uuid::Uuid;

use super::channels::OutboundSender;

/// Serialized envelope shared between every recipient of a broadcast.
pub type OutboundMessage = Arc<str>;

/// Channel name prefix of overlay widgets.
pub const OVERLAY_CHANNEL_PREFIX: &str = "overlay:";
/// Channel name prefix of admin dashboards.
pub const ADMIN_CHANNEL_PREFIX: &str = "admin:";

pub fn overlay_channel(token: &str) -> String {
    format!("{OVERLAY_CHANNEL_PREFIX}{token}")
}

pub fn admin_channel(user_id: &str) -> String {
    format!("{ADMIN_CHANNEL_PREFIX}{user_id}")
}

/// Requests handled by the connection hub actor, in arrival order.
#[derive(Debug)]
pub enum HubCommand {
    Register {
        id: Uuid,
        channel: String,
        sender: OutboundSender,
    },
    Unregister {
        id: Uuid,
        channel: String,
    },
    Broadcast {
        channel: String,
        message: OutboundMessage,
    },
    BroadcastDonation(DonationEvent),
}
