//! Midtrans adapter.
//!
//! Notifications are authenticated by the `signature_key` field of the body.
//! `settlement_time` is reported in Jakarta time (UTC+7) without an offset.

use async_trait::async_trait;
use http::HeaderMap;
use reveegate_sdk::objects::MidtransNotification;
use reveegate_sdk::signature::verify_midtrans_signature;
use time::macros::{format_description, offset};
use time::{OffsetDateTime, PrimitiveDateTime};

use super::{CanonicalWebhook, PaymentProvider, ProviderError, ProviderStatus, parse_amount};
use crate::entities::{PaymentProvider as ProviderName, PaymentStatus};

pub const SANDBOX_BASE_URL: &str = "https://api.sandbox.midtrans.com";
pub const PRODUCTION_BASE_URL: &str = "https://api.midtrans.com";

#[derive(Debug, Clone)]
pub struct MidtransConfig {
    pub server_key: String,
    pub is_production: bool,
    /// Overrides the sandbox/production API root.
    pub base_url: Option<String>,
}

pub struct MidtransProvider {
    server_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl MidtransProvider {
    pub fn new(config: MidtransConfig) -> Self {
        let base_url = config.base_url.unwrap_or_else(|| {
            if config.is_production {
                PRODUCTION_BASE_URL.to_string()
            } else {
                SANDBOX_BASE_URL.to_string()
            }
        });
        Self {
            server_key: config.server_key,
            base_url,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Map a Midtrans `transaction_status` to a payment status.
///
/// `capture` only counts as paid when fraud screening accepted it (or was
/// not reported). Unknown values stay pending.
pub fn map_status(transaction_status: &str, fraud_status: Option<&str>) -> PaymentStatus {
    match transaction_status {
        "capture" => match fraud_status {
            None | Some("") | Some("accept") => PaymentStatus::Paid,
            Some(_) => PaymentStatus::Pending,
        },
        "settlement" => PaymentStatus::Paid,
        "pending" => PaymentStatus::Pending,
        "deny" | "cancel" | "failure" => PaymentStatus::Failed,
        "expire" => PaymentStatus::Expired,
        _ => PaymentStatus::Pending,
    }
}

/// Parse a `YYYY-MM-DD hh:mm:ss` Jakarta timestamp.
pub fn parse_midtrans_time(raw: &str) -> Option<OffsetDateTime> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw.trim(), &format)
        .ok()
        .map(|t| t.assume_offset(offset!(+7)))
}

fn paid_at(notification: &MidtransNotification, status: PaymentStatus) -> Option<OffsetDateTime> {
    if status != PaymentStatus::Paid {
        return None;
    }
    notification
        .settlement_time
        .as_deref()
        .or(notification.transaction_time.as_deref())
        .and_then(parse_midtrans_time)
}

fn is_safe_order_id(order_id: &str) -> bool {
    !order_id.is_empty()
        && order_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
}

#[async_trait]
impl PaymentProvider for MidtransProvider {
    fn provider(&self) -> ProviderName {
        ProviderName::Midtrans
    }

    fn verify_webhook(&self, body: &[u8], _headers: &HeaderMap) -> Result<(), ProviderError> {
        let n: MidtransNotification = serde_json::from_slice(body)?;
        verify_midtrans_signature(
            &n.order_id,
            &n.status_code,
            &n.gross_amount,
            &self.server_key,
            &n.signature_key,
        )?;
        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<CanonicalWebhook, ProviderError> {
        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;
        let n: MidtransNotification = serde_json::from_value(raw_payload.clone())?;
        if n.order_id.is_empty() || n.transaction_id.is_empty() {
            return Err(ProviderError::Validation(
                "order_id and transaction_id are required".into(),
            ));
        }
        let status = map_status(&n.transaction_status, n.fraud_status.as_deref());
        Ok(CanonicalWebhook {
            provider: ProviderName::Midtrans,
            paid_at: paid_at(&n, status),
            gross_amount: parse_amount(&n.gross_amount),
            order_id: n.order_id,
            transaction_id: n.transaction_id,
            status,
            raw_payload,
        })
    }

    async fn get_status(&self, order_id: &str) -> Result<ProviderStatus, ProviderError> {
        if !is_safe_order_id(order_id) {
            return Err(ProviderError::Validation(format!(
                "unsupported order id: {order_id}"
            )));
        }
        let url = format!("{}/v2/{order_id}/status", self.base_url);
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.server_key, Some(""))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw_payload: serde_json::Value = resp.json().await?;
        // Midtrans answers unknown orders with HTTP 200 and status_code "404".
        if raw_payload.get("status_code").and_then(|v| v.as_str()) == Some("404") {
            return Err(ProviderError::NotFound(order_id.to_string()));
        }
        let n: MidtransNotification = serde_json::from_value(raw_payload.clone())?;
        let status = map_status(&n.transaction_status, n.fraud_status.as_deref());
        Ok(ProviderStatus {
            order_id: n.order_id.clone(),
            transaction_id: (!n.transaction_id.is_empty()).then(|| n.transaction_id.clone()),
            paid_at: paid_at(&n, status),
            status,
            raw_payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reveegate_sdk::signature::midtrans_signature;
    use time::macros::datetime;

    const KEY: &str = "SB-Mid-server-test";

    fn provider() -> MidtransProvider {
        MidtransProvider::new(MidtransConfig {
            server_key: KEY.into(),
            is_production: false,
            base_url: None,
        })
    }

    fn body(status: &str, signature: &str) -> Vec<u8> {
        serde_json::json!({
            "order_id": "DON-abc",
            "transaction_id": "tx-1",
            "transaction_status": status,
            "transaction_time": "2024-01-15 17:20:11",
            "settlement_time": "2024-01-15 17:21:00",
            "status_code": "200",
            "gross_amount": "50000.00",
            "signature_key": signature,
            "fraud_status": "accept"
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn status_table() {
        assert_eq!(map_status("capture", Some("accept")), PaymentStatus::Paid);
        assert_eq!(map_status("capture", None), PaymentStatus::Paid);
        assert_eq!(map_status("capture", Some("challenge")), PaymentStatus::Pending);
        assert_eq!(map_status("settlement", None), PaymentStatus::Paid);
        assert_eq!(map_status("pending", None), PaymentStatus::Pending);
        assert_eq!(map_status("deny", None), PaymentStatus::Failed);
        assert_eq!(map_status("cancel", None), PaymentStatus::Failed);
        assert_eq!(map_status("expire", None), PaymentStatus::Expired);
        assert_eq!(map_status("refund", None), PaymentStatus::Pending);
    }

    #[test]
    fn base_url_by_environment() {
        assert_eq!(provider().base_url(), SANDBOX_BASE_URL);
        let prod = MidtransProvider::new(MidtransConfig {
            server_key: KEY.into(),
            is_production: true,
            base_url: None,
        });
        assert_eq!(prod.base_url(), PRODUCTION_BASE_URL);
    }

    #[test]
    fn verifies_signed_notification() {
        let sig = midtrans_signature("DON-abc", "200", "50000.00", KEY);
        let headers = HeaderMap::new();
        assert!(provider().verify_webhook(&body("settlement", &sig), &headers).is_ok());
        assert!(matches!(
            provider().verify_webhook(&body("settlement", "deadbeef"), &headers),
            Err(ProviderError::Auth(_))
        ));
        assert!(matches!(
            provider().verify_webhook(b"{not json", &headers),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn parses_settlement_into_canonical_form() {
        let canonical = provider().parse_webhook(&body("settlement", "x")).unwrap();
        assert_eq!(canonical.order_id, "DON-abc");
        assert_eq!(canonical.transaction_id, "tx-1");
        assert_eq!(canonical.status, PaymentStatus::Paid);
        assert_eq!(canonical.gross_amount, Some(50_000));
        assert_eq!(canonical.paid_at, Some(datetime!(2024-01-15 10:21 UTC)));
        assert_eq!(canonical.raw_payload["order_id"], "DON-abc");
    }

    #[test]
    fn pending_has_no_paid_at() {
        let canonical = provider().parse_webhook(&body("pending", "x")).unwrap();
        assert_eq!(canonical.status, PaymentStatus::Pending);
        assert_eq!(canonical.paid_at, None);
    }

    #[test]
    fn order_id_guard() {
        assert!(is_safe_order_id("DON-abc_1"));
        assert!(!is_safe_order_id("../admin"));
        assert!(!is_safe_order_id(""));
    }
}
