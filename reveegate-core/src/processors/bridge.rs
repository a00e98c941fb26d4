//! DistributionBridge processor.
//!
//! The DistributionBridge is responsible for:
//! - Holding the single broker subscription of a process
//! - Decoding `DonationEvent` payloads and forwarding them to the hub
//! - Re-subscribing after the subscription fails or ends
//!
//! It stops together with the hub.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use rand::Rng;
use reveegate_sdk::objects::{DONATIONS_TOPIC, DonationEvent};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::realtime::HubHandle;
use crate::store::{Broker, BrokerError, BrokerStream};

/// Base wait before re-subscribing.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

enum StreamEnd {
    Shutdown,
    Lost,
}

pub struct DistributionBridge {
    broker: Arc<dyn Broker>,
    hub: HubHandle,
    topic: String,
    retry_delay: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl DistributionBridge {
    pub fn new(broker: Arc<dyn Broker>, hub: HubHandle) -> Self {
        let shutdown_rx = hub.shutdown_receiver();
        Self {
            broker,
            hub,
            topic: DONATIONS_TOPIC.to_string(),
            retry_delay: DEFAULT_RETRY_DELAY,
            shutdown_rx,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Run the DistributionBridge until the hub stops.
    pub async fn run(mut self) {
        info!(topic = %self.topic, "DistributionBridge started");

        while !*self.shutdown_rx.borrow() {
            let subscribed = tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => continue,
                result = self.broker.subscribe(&self.topic) => result,
            };

            match subscribed {
                Ok(stream) => {
                    info!(topic = %self.topic, "Subscribed to donation events");
                    match self.consume(stream).await {
                        StreamEnd::Shutdown => break,
                        StreamEnd::Lost => warn!(topic = %self.topic, "Broker subscription lost"),
                    }
                }
                Err(e) => error!(topic = %self.topic, error = %e, "Failed to subscribe"),
            }

            let delay = self.jittered_delay();
            debug!(delay_ms = delay.as_millis() as u64, "Re-subscribing after delay");
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("DistributionBridge shutdown complete");
    }

    async fn consume(&mut self, mut stream: BrokerStream) -> StreamEnd {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        return StreamEnd::Shutdown;
                    }
                }

                item = stream.next() => match item {
                    Some(Ok(payload)) => {
                        if !self.forward(&payload).await {
                            return StreamEnd::Shutdown;
                        }
                    }
                    Some(Err(BrokerError::Lagged(skipped))) => {
                        warn!(skipped, "Donation subscriber lagged, events dropped");
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Broker stream error");
                        return StreamEnd::Lost;
                    }
                    None => return StreamEnd::Lost,
                }
            }
        }
    }

    /// Forward one payload. Returns `false` once the hub is gone.
    async fn forward(&self, payload: &Bytes) -> bool {
        let event: DonationEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "Dropping undecodable donation event");
                return true;
            }
        };

        debug!(donation_id = %event.id, "Forwarding donation event to hub");
        match self.hub.broadcast_donation(event).await {
            Ok(()) => true,
            Err(e) => {
                info!(error = %e, "Hub unavailable, stopping bridge");
                false
            }
        }
    }

    fn jittered_delay(&self) -> Duration {
        let max_jitter = (self.retry_delay.as_millis() / 4) as u64;
        let jitter = rand::rng().random_range(0..=max_jitter);
        self.retry_delay + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::outbound_channel;
    use crate::realtime::{ConnectionHub, HubConfig};
    use crate::store::MemoryBroker;
    use reveegate_sdk::objects::{WsEnvelope, WsMessageKind};
    use time::OffsetDateTime;
    use tokio::time::timeout;
    use uuid::Uuid;

    async fn wait_for_subscriber(broker: &MemoryBroker) {
        timeout(Duration::from_secs(2), async {
            while broker.subscriber_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn undecodable_payloads_are_skipped() {
        let broker = Arc::new(MemoryBroker::new());
        let (hub, handle) = ConnectionHub::new(HubConfig::default());
        tokio::spawn(hub.run());
        let bridge = tokio::spawn(DistributionBridge::new(broker.clone(), handle.clone()).run());

        let (tx, mut overlay) = outbound_channel(8);
        handle.register(Uuid::new_v4(), "overlay:T1".into(), tx).await.unwrap();
        wait_for_subscriber(&broker).await;

        broker
            .publish(DONATIONS_TOPIC, Bytes::from_static(b"{garbage"))
            .await
            .unwrap();
        let event = DonationEvent::new(Uuid::new_v4(), "Budi", "", 50_000, OffsetDateTime::now_utc());
        broker
            .publish(DONATIONS_TOPIC, Bytes::from(serde_json::to_vec(&event).unwrap()))
            .await
            .unwrap();

        let frame = timeout(Duration::from_secs(2), overlay.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope: WsEnvelope = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope.kind, WsMessageKind::Donation);
        assert_eq!(envelope.data.unwrap()["id"], event.id.to_string());

        handle.stop();
        timeout(Duration::from_secs(2), bridge).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn retries_until_broker_recovers() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_unavailable(true);
        let (hub, handle) = ConnectionHub::new(HubConfig::default());
        tokio::spawn(hub.run());
        let bridge = tokio::spawn(
            DistributionBridge::new(broker.clone(), handle.clone())
                .with_retry_delay(Duration::from_millis(20))
                .run(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.subscriber_count(), 0);
        broker.set_unavailable(false);
        wait_for_subscriber(&broker).await;

        handle.stop();
        timeout(Duration::from_secs(2), bridge).await.unwrap().unwrap();
    }
}
