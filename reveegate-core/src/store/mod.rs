//! Collaborator contracts of the notification pipeline.
//!
//! The pipeline only talks to storage, the idempotency store and the broker
//! through the traits below. Postgres and Redis implementations back the
//! server; the in-memory ones back tests and local runs.

pub mod memory;
pub mod postgres;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{Donation, Payment, PaymentProvider, WebhookLog};

pub use memory::{MemoryBroker, MemoryDonationStore, MemoryIdempotencyStore};
pub use postgres::PgDonationStore;
pub use redis::{RedisBroker, RedisIdempotencyStore};

/// Retention window of an idempotency claim.
pub const IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Value written when a callback is claimed.
pub const CLAIM_VALUE: &str = "processing";

/// `webhook:{provider}:{order_id}:{transaction_id}`
pub fn idempotency_key(provider: PaymentProvider, order_id: &str, transaction_id: &str) -> String {
    format!("webhook:{provider}:{order_id}:{transaction_id}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("subscriber lagged, {0} messages skipped")]
    Lagged(u64),
}

/// Payment and donation persistence.
#[async_trait]
pub trait DonationStore: Send + Sync {
    async fn payment_by_external_id(
        &self,
        provider: PaymentProvider,
        external_id: &str,
    ) -> Result<Option<Payment>, StoreError>;

    async fn payment_by_id(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn donation_by_id(&self, id: Uuid) -> Result<Option<Donation>, StoreError>;

    /// Persist both rows atomically.
    ///
    /// Returns `false`, writing nothing, when the stored payment is already
    /// in a terminal state.
    async fn persist_transition(
        &self,
        payment: &Payment,
        donation: &Donation,
    ) -> Result<bool, StoreError>;

    async fn record_webhook(&self, log: WebhookLog) -> Result<(), StoreError>;
}

/// Atomic set-if-absent with expiry, shared by every gateway instance.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// `true` when this call created the key.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, IdempotencyError>;

    /// Drop a claim whose processing failed before any state was written.
    async fn release(&self, key: &str) -> Result<(), IdempotencyError>;
}

/// Raw payloads received from a broker subscription.
pub type BrokerStream = BoxStream<'static, Result<Bytes, BrokerError>>;

/// Publish/subscribe transport between event producers and hubs.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// The stream ends when the subscription is lost.
    async fn subscribe(&self, topic: &str) -> Result<BrokerStream, BrokerError>;
}
