//! Event channel factories and handles.
//!
//! Provides factory functions for the hub command queue and the bounded
//! per-connection outbound queues.

use super::types::{HubCommand, OutboundMessage};
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for hub commands.
pub type HubCommandSender = mpsc::Sender<HubCommand>;
/// Receiver handle for hub commands.
pub type HubCommandReceiver = mpsc::Receiver<HubCommand>;

/// Sender side of a connection's outbound queue.
///
/// The hub owns the only strong sender of every registered connection;
/// dropping it ends the connection's write loop.
pub type OutboundSender = mpsc::Sender<OutboundMessage>;
/// Non-owning sender used by a connection to answer its own commands.
pub type WeakOutboundSender = mpsc::WeakSender<OutboundMessage>;
/// Receiver side of a connection's outbound queue, drained by the write loop.
pub type OutboundReceiver = mpsc::Receiver<OutboundMessage>;

/// Create a new hub command channel.
pub fn hub_command_channel() -> (HubCommandSender, HubCommandReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new outbound queue with room for `capacity` messages.
pub fn outbound_channel(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(capacity.max(1))
}
