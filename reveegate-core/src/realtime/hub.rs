//! ConnectionHub actor.
//!
//! The ConnectionHub is responsible for:
//! - Owning the channel registry (`channel -> {connection id -> outbound queue}`)
//! - Applying register/unregister requests in arrival order
//! - Fanning messages out to every member of a channel without ever blocking
//! - Dropping members whose outbound queue is full (drop-slow-consumer)
//!
//! The registry is only touched from the actor task. Everything else talks to
//! it through a cloneable [`HubHandle`]. Aggregate counts are published to a
//! snapshot behind a read lock after each command, so they may trail the
//! registry by a few commands.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use reveegate_sdk::objects::ws::WsEnvelope;
use reveegate_sdk::objects::{DonationEvent, HubStats};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::{
    ADMIN_CHANNEL_PREFIX, HubCommand, HubCommandReceiver, HubCommandSender,
    OVERLAY_CHANNEL_PREFIX, OutboundMessage, OutboundSender, hub_command_channel,
};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("connection hub has stopped")]
    Stopped,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Hub behaviour switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubConfig {
    /// Also deliver donation broadcasts to `admin:` channels.
    pub admin_donation_feed: bool,
}

type Registry = HashMap<String, HashMap<Uuid, OutboundSender>>;

/// Outbound queues still registered when the hub stopped.
///
/// Stopping the hub does not close connections; holding this value keeps
/// their queues open until it is dropped.
pub struct DetachedConnections(Registry);

impl DetachedConnections {
    pub fn len(&self) -> usize {
        self.0.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ConnectionHub {
    channels: Registry,
    command_rx: HubCommandReceiver,
    shutdown_rx: watch::Receiver<bool>,
    stats: Arc<RwLock<HubStats>>,
    config: HubConfig,
}

/// Cheap, cloneable entry point to a running [`ConnectionHub`].
#[derive(Clone)]
pub struct HubHandle {
    command_tx: HubCommandSender,
    shutdown_tx: Arc<watch::Sender<bool>>,
    stats: Arc<RwLock<HubStats>>,
}

impl ConnectionHub {
    /// Create a hub and its handle. The hub does nothing until [`run`](Self::run).
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (command_tx, command_rx) = hub_command_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(RwLock::new(HubStats::default()));
        let hub = Self {
            channels: HashMap::new(),
            command_rx,
            shutdown_rx,
            stats: stats.clone(),
            config,
        };
        let handle = HubHandle {
            command_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            stats,
        };
        (hub, handle)
    }

    /// Run the actor loop until [`HubHandle::stop`] is called or every
    /// handle is dropped.
    pub async fn run(mut self) -> DetachedConnections {
        info!("ConnectionHub started");

        loop {
            tokio::select! {
                biased;

                res = self.shutdown_rx.changed() => {
                    if res.is_err() {
                        info!("Every hub handle dropped");
                        break;
                    }
                    if *self.shutdown_rx.borrow() {
                        info!("ConnectionHub received shutdown signal");
                        break;
                    }
                }

                Some(command) = self.command_rx.recv() => {
                    self.handle(command).await;
                }

                else => {
                    info!("Hub command channel closed");
                    break;
                }
            }
        }

        let detached = DetachedConnections(std::mem::take(&mut self.channels));
        info!(
            connections = detached.len(),
            "ConnectionHub shutdown complete"
        );
        detached
    }

    async fn handle(&mut self, command: HubCommand) {
        // Removed queues are dropped only after the snapshot is refreshed, so
        // a closed queue implies an up-to-date snapshot.
        let _dropped: Vec<OutboundSender> = match command {
            HubCommand::Register {
                id,
                channel,
                sender,
            } => {
                self.register(id, channel, sender);
                Vec::new()
            }
            HubCommand::Unregister { id, channel } => {
                self.unregister(&channel, id).into_iter().collect()
            }
            HubCommand::Broadcast { channel, message } => self.broadcast(&channel, &message),
            HubCommand::BroadcastDonation(event) => self.broadcast_donation(&event),
        };
        self.publish_stats().await;
    }

    fn register(&mut self, id: Uuid, channel: String, sender: OutboundSender) {
        let members = self.channels.entry(channel.clone()).or_default();
        members.insert(id, sender);
        debug!(
            client_id = %id,
            channel = %channel,
            channel_clients = members.len(),
            "Client registered"
        );
    }

    /// Remove a member. Unknown ids are ignored.
    fn unregister(&mut self, channel: &str, id: Uuid) -> Option<OutboundSender> {
        let members = self.channels.get_mut(channel)?;
        let removed = members.remove(&id);
        if members.is_empty() {
            self.channels.remove(channel);
        }
        if removed.is_some() {
            debug!(client_id = %id, channel = %channel, "Client unregistered");
        }
        removed
    }

    fn broadcast(&mut self, channel: &str, message: &OutboundMessage) -> Vec<OutboundSender> {
        let Some(members) = self.channels.get(channel) else {
            return Vec::new();
        };

        let mut dead = Vec::new();
        for (id, sender) in members {
            match sender.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(client_id = %id, channel = %channel, "Outbound queue full, dropping slow client");
                    dead.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client_id = %id, channel = %channel, "Outbound queue closed");
                    dead.push(*id);
                }
            }
        }

        dead.into_iter()
            .filter_map(|id| self.unregister(channel, id))
            .collect()
    }

    fn broadcast_donation(&mut self, event: &DonationEvent) -> Vec<OutboundSender> {
        let message: OutboundMessage = match WsEnvelope::donation(event).to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                error!(error = %e, donation_id = %event.id, "Failed to encode donation envelope");
                return Vec::new();
            }
        };

        let admin_feed = self.config.admin_donation_feed;
        let targets: Vec<String> = self
            .channels
            .keys()
            .filter(|name| {
                name.starts_with(OVERLAY_CHANNEL_PREFIX)
                    || (admin_feed && name.starts_with(ADMIN_CHANNEL_PREFIX))
            })
            .cloned()
            .collect();

        debug!(
            donation_id = %event.id,
            channels = targets.len(),
            "Broadcasting donation"
        );

        targets
            .iter()
            .flat_map(|channel| self.broadcast(channel, &message))
            .collect()
    }

    async fn publish_stats(&self) {
        let channels: BTreeMap<String, usize> = self
            .channels
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect();
        let snapshot = HubStats {
            total_clients: channels.values().sum(),
            total_channels: channels.len(),
            channels,
        };
        *self.stats.write().await = snapshot;
    }
}

impl HubHandle {
    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| HubError::Stopped)
    }

    /// Add a connection's outbound queue to `channel`.
    ///
    /// The hub keeps the only strong sender; once it drops it (unregister,
    /// slow consumer) the connection's write loop ends.
    pub async fn register(
        &self,
        id: Uuid,
        channel: String,
        sender: OutboundSender,
    ) -> Result<(), HubError> {
        self.send(HubCommand::Register {
            id,
            channel,
            sender,
        })
        .await
    }

    /// Remove a connection. Safe to call more than once.
    pub async fn unregister(&self, id: Uuid, channel: String) -> Result<(), HubError> {
        self.send(HubCommand::Unregister { id, channel }).await
    }

    pub async fn broadcast(
        &self,
        channel: String,
        message: impl Into<OutboundMessage>,
    ) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast {
            channel,
            message: message.into(),
        })
        .await
    }

    /// Deliver a donation to every overlay channel (and admin channels when
    /// the admin feed is enabled).
    pub async fn broadcast_donation(&self, event: DonationEvent) -> Result<(), HubError> {
        self.send(HubCommand::BroadcastDonation(event)).await
    }

    pub async fn stats(&self) -> HubStats {
        self.stats.read().await.clone()
    }

    pub async fn client_count(&self) -> usize {
        self.stats.read().await.total_clients
    }

    /// Stop the actor loop and every task watching [`shutdown_receiver`](Self::shutdown_receiver).
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}
