//! In-process collaborators.
//!
//! Each store can be switched into an "unavailable" mode to exercise the
//! pipeline's outage handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use uuid::Uuid;

use super::{
    Broker, BrokerError, BrokerStream, DonationStore, IdempotencyError, IdempotencyStore,
    StoreError,
};
use crate::entities::{Donation, Payment, PaymentProvider, WebhookLog};

// ---------------------------------------------------------------------------
// Donations and payments
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    payments: HashMap<Uuid, Payment>,
    donations: HashMap<Uuid, Donation>,
    webhook_logs: Vec<WebhookLog>,
}

#[derive(Default)]
pub struct MemoryDonationStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryDonationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, payment: Payment, donation: Donation) {
        let mut tables = self.tables.lock().await;
        tables.donations.insert(donation.id, donation);
        tables.payments.insert(payment.id, payment);
    }

    pub async fn payment(&self, id: Uuid) -> Option<Payment> {
        self.tables.lock().await.payments.get(&id).cloned()
    }

    pub async fn donation(&self, id: Uuid) -> Option<Donation> {
        self.tables.lock().await.donations.get(&id).cloned()
    }

    pub async fn webhook_logs(&self) -> Vec<WebhookLog> {
        self.tables.lock().await.webhook_logs.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DonationStore for MemoryDonationStore {
    async fn payment_by_external_id(
        &self,
        provider: PaymentProvider,
        external_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.provider == provider && p.external_id == external_id)
            .cloned())
    }

    async fn payment_by_id(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        self.check()?;
        Ok(self.payment(id).await)
    }

    async fn donation_by_id(&self, id: Uuid) -> Result<Option<Donation>, StoreError> {
        self.check()?;
        Ok(self.donation(id).await)
    }

    async fn persist_transition(
        &self,
        payment: &Payment,
        donation: &Donation,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        let terminal = tables
            .payments
            .get(&payment.id)
            .is_some_and(|stored| stored.status.is_terminal());
        if terminal {
            return Ok(false);
        }
        tables.payments.insert(payment.id, payment.clone());
        tables.donations.insert(donation.id, donation.clone());
        Ok(true)
    }

    async fn record_webhook(&self, log: WebhookLog) -> Result<(), StoreError> {
        self.check()?;
        self.tables.lock().await.webhook_logs.push(log);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    unavailable: AtomicBool,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), IdempotencyError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdempotencyError::Unavailable(
                "memory store switched off".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, IdempotencyError> {
        self.check()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if let Some((_, expires_at)) = entries.get(key)
            && *expires_at > now
        {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), IdempotencyError> {
        self.check()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// Fire-and-forget topic fan-out; publishing without subscribers drops the
/// payload, like Redis `PUBLISH`.
pub struct MemoryBroker {
    tx: broadcast::Sender<(String, Bytes)>,
    unavailable: AtomicBool,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(crate::events::DEFAULT_CHANNEL_BUFFER);
        Self {
            tx,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), BrokerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("memory broker switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.check()?;
        let _ = self.tx.send((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BrokerStream, BrokerError> {
        self.check()?;
        let topic = topic.to_string();
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| {
            let matched = match item {
                Ok((t, payload)) if t == topic => Some(Ok(payload)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(n)) => Some(Err(BrokerError::Lagged(n))),
            };
            std::future::ready(matched)
        });
        Ok(stream.boxed())
    }
}
