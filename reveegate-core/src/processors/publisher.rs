use std::sync::Arc;

use bytes::Bytes;
use reveegate_sdk::objects::{DONATIONS_TOPIC, DonationEvent};
use thiserror::Error;
use tracing::debug;

use crate::store::{Broker, BrokerError};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode donation event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Publishes settled donations on the broker.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    topic: String,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            topic: DONATIONS_TOPIC.to_string(),
        }
    }

    pub async fn publish(&self, event: &DonationEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.broker.publish(&self.topic, Bytes::from(payload)).await?;
        debug!(donation_id = %event.id, topic = %self.topic, "Donation event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBroker;
    use futures_util::StreamExt;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[tokio::test]
    async fn publishes_json_on_donations_topic() {
        let broker = Arc::new(MemoryBroker::new());
        let mut stream = broker.subscribe(DONATIONS_TOPIC).await.unwrap();
        let publisher = EventPublisher::new(broker.clone());

        let event = DonationEvent::new(Uuid::new_v4(), "Sari", "", 25_000, OffsetDateTime::now_utc());
        publisher.publish(&event).await.unwrap();

        let raw = stream.next().await.unwrap().unwrap();
        let decoded: DonationEvent = serde_json::from_slice(&raw).unwrap();
        assert_eq!(decoded.id, event.id);
        assert_eq!(decoded.event_type, "new_donation");
    }

    #[tokio::test]
    async fn broker_outage_is_reported() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_unavailable(true);
        let publisher = EventPublisher::new(broker);
        let event = DonationEvent::new(Uuid::new_v4(), "Sari", "", 25_000, OffsetDateTime::now_utc());
        assert!(matches!(
            publisher.publish(&event).await,
            Err(PublishError::Broker(BrokerError::Unavailable(_)))
        ));
    }
}
