//! Payment provider adapters.
//!
//! Ingress and reconciliation only depend on [`PaymentProvider`]; each
//! adapter owns its signature scheme and status vocabulary.

pub mod midtrans;
pub mod xendit;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use thiserror::Error;
use time::OffsetDateTime;

use crate::entities::{PaymentProvider as ProviderName, PaymentStatus};

pub use midtrans::{MidtransConfig, MidtransProvider};
pub use xendit::{XenditConfig, XenditProvider};

/// Provider-independent view of a callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalWebhook {
    pub provider: ProviderName,
    pub order_id: String,
    pub transaction_id: String,
    /// Never `Refunded`.
    pub status: PaymentStatus,
    pub paid_at: Option<OffsetDateTime>,
    /// Amount reported by the provider, in minor units.
    pub gross_amount: Option<i64>,
    pub raw_payload: serde_json::Value,
}

/// Status obtained by polling the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStatus {
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: Option<OffsetDateTime>,
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("malformed payload: {0}")]
    Validation(String),
    #[error("authentication failed: {0}")]
    Auth(#[from] reveegate_sdk::signature::SignatureError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider api error: status {status}, body: {body}")]
    Api { status: u16, body: String },
    #[error("transaction not found at provider: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Validation(e.to_string())
    }
}

/// Capability contract of a payment provider.
///
/// Charge creation is handled by the checkout service and is not part of
/// this contract.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn provider(&self) -> ProviderName;

    /// Authenticate a raw callback. Must not have side effects.
    fn verify_webhook(&self, body: &[u8], headers: &HeaderMap) -> Result<(), ProviderError>;

    fn parse_webhook(&self, body: &[u8]) -> Result<CanonicalWebhook, ProviderError>;

    async fn get_status(&self, order_id: &str) -> Result<ProviderStatus, ProviderError>;
}

/// Configured providers, keyed by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderName, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    pub fn get(&self, provider: ProviderName) -> Option<&Arc<dyn PaymentProvider>> {
        self.providers.get(&provider)
    }
}

/// Convert a decimal amount string such as `"50000.00"` to minor units.
pub(crate) fn parse_amount(raw: &str) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;
    raw.trim()
        .parse::<rust_decimal::Decimal>()
        .ok()
        .and_then(|d| d.trunc().to_i64())
}
