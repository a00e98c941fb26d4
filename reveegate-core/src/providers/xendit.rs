//! Xendit adapter.
//!
//! Callbacks are authenticated by the account's verification token in the
//! `x-callback-token` header. Status polling uses the invoice API.

use async_trait::async_trait;
use http::HeaderMap;
use reveegate_sdk::objects::XenditCallback;
use reveegate_sdk::signature::{CALLBACK_TOKEN_HEADER, verify_callback_token};
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{CanonicalWebhook, PaymentProvider, ProviderError, ProviderStatus};
use crate::entities::{PaymentProvider as ProviderName, PaymentStatus};

pub const BASE_URL: &str = "https://api.xendit.co";

#[derive(Debug, Clone)]
pub struct XenditConfig {
    pub webhook_token: String,
    pub secret_key: String,
    pub base_url: Option<String>,
}

pub struct XenditProvider {
    webhook_token: String,
    secret_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl XenditProvider {
    pub fn new(config: XenditConfig) -> Self {
        Self {
            webhook_token: config.webhook_token,
            secret_key: config.secret_key,
            base_url: config.base_url.unwrap_or_else(|| BASE_URL.to_string()),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

/// Map a Xendit invoice/payment status. Unknown values stay pending.
pub fn map_status(status: &str) -> PaymentStatus {
    match status {
        "PAID" | "SETTLED" | "COMPLETED" => PaymentStatus::Paid,
        "PENDING" | "ACTIVE" => PaymentStatus::Pending,
        "EXPIRED" => PaymentStatus::Expired,
        "FAILED" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

fn parse_paid_at(raw: Option<&str>, status: PaymentStatus) -> Option<OffsetDateTime> {
    if status != PaymentStatus::Paid {
        return None;
    }
    raw.and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
}

#[derive(Debug, Deserialize)]
struct Invoice {
    id: String,
    external_id: String,
    status: String,
    #[serde(default)]
    paid_at: Option<String>,
}

#[async_trait]
impl PaymentProvider for XenditProvider {
    fn provider(&self) -> ProviderName {
        ProviderName::Xendit
    }

    fn verify_webhook(&self, _body: &[u8], headers: &HeaderMap) -> Result<(), ProviderError> {
        let provided = headers
            .get(CALLBACK_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        verify_callback_token(provided, &self.webhook_token)?;
        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<CanonicalWebhook, ProviderError> {
        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;
        let callback: XenditCallback = serde_json::from_value(raw_payload.clone())?;
        if callback.external_id.is_empty() || callback.id.is_empty() {
            return Err(ProviderError::Validation(
                "id and external_id are required".into(),
            ));
        }
        let status = map_status(&callback.status);
        Ok(CanonicalWebhook {
            provider: ProviderName::Xendit,
            paid_at: parse_paid_at(callback.paid_at.as_deref(), status),
            gross_amount: callback.amount.and_then(|a| a.trunc().to_i64()),
            order_id: callback.external_id,
            transaction_id: callback.id,
            status,
            raw_payload,
        })
    }

    async fn get_status(&self, order_id: &str) -> Result<ProviderStatus, ProviderError> {
        let url = format!("{}/v2/invoices", self.base_url);
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.secret_key, Some(""))
            .query(&[("external_id", order_id)])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(order_id.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw_payload: serde_json::Value = resp.json().await?;
        let invoices: Vec<Invoice> = serde_json::from_value(raw_payload.clone())?;
        // Newest invoice first.
        let invoice = invoices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(order_id.to_string()))?;
        let status = map_status(&invoice.status);
        Ok(ProviderStatus {
            paid_at: parse_paid_at(invoice.paid_at.as_deref(), status),
            order_id: invoice.external_id,
            transaction_id: Some(invoice.id),
            status,
            raw_payload,
        })
    }
}
