//! Event channels of the real-time pipeline.
//!
//! # Event Flow
//!
//! 1. `WebhookIngress` -> `ReconciliationEngine` (direct call)
//! 2. `ReconciliationEngine` -> `EventPublisher` -> broker topic `donations:new`
//! 3. `DistributionBridge` consumes the topic -> `HubCommand::BroadcastDonation`
//! 4. `ConnectionHub` fans out -> per-connection `OutboundSender`
//!
//! Only steps 3 and 4 travel over in-process channels; the broker decouples
//! producers from hub instances so several gateway processes can share one feed.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, HubCommandReceiver, HubCommandSender, OutboundReceiver,
    OutboundSender, WeakOutboundSender, hub_command_channel, outbound_channel,
};

pub use types::{
    ADMIN_CHANNEL_PREFIX, HubCommand, OVERLAY_CHANNEL_PREFIX, OutboundMessage, admin_channel,
    overlay_channel,
};
