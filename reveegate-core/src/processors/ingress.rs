//! WebhookIngress processor.
//!
//! Order of operations for every provider callback:
//! 1. Authenticate (signature or callback token). Nothing is written before this.
//! 2. Decode into a [`CanonicalWebhook`].
//! 3. Record the callback for audit (best effort).
//! 4. Claim the idempotency key; an existing claim makes the call a no-op.
//! 5. Reconcile.

use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use kanau::processor::Processor;
use reveegate_sdk::signature::{CALLBACK_TOKEN_HEADER, SignatureError, mask_secret};
use thiserror::Error;
use tracing::{error, info, warn};

use super::reconciliation::{ReconcileError, ReconcileOutcome, ReconciliationEngine};
use crate::entities::{PaymentProvider, WebhookLog};
use crate::providers::{CanonicalWebhook, ProviderError, ProviderRegistry};
use crate::store::{
    CLAIM_VALUE, DonationStore, IDEMPOTENCY_TTL, IdempotencyStore, idempotency_key,
};

#[derive(Debug, Clone, Copy)]
pub struct IngressConfig {
    pub idempotency_ttl: Duration,
    /// Reject callbacks while the idempotency store is unreachable instead of
    /// processing them without duplicate protection.
    pub fail_closed: bool,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: IDEMPOTENCY_TTL,
            fail_closed: false,
        }
    }
}

#[derive(Debug)]
pub enum IngestOutcome {
    Processed(ReconcileOutcome),
    /// The callback was already claimed; nothing was changed.
    Duplicate,
    /// No payment matches the callback's order id.
    NotFound,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("provider {0} is not configured")]
    UnknownProvider(PaymentProvider),
    #[error("webhook authentication failed: {0}")]
    Auth(#[from] SignatureError),
    #[error("invalid webhook payload: {0}")]
    Validation(String),
    #[error("idempotency store unavailable: {0}")]
    Transient(String),
    #[error("webhook processing failed: {0}")]
    Processing(#[from] ReconcileError),
}

pub struct WebhookIngress {
    providers: ProviderRegistry,
    idempotency: Arc<dyn IdempotencyStore>,
    store: Arc<dyn DonationStore>,
    engine: ReconciliationEngine,
    config: IngressConfig,
}

impl WebhookIngress {
    pub fn new(
        providers: ProviderRegistry,
        idempotency: Arc<dyn IdempotencyStore>,
        store: Arc<dyn DonationStore>,
        engine: ReconciliationEngine,
        config: IngressConfig,
    ) -> Self {
        Self {
            providers,
            idempotency,
            store,
            engine,
            config,
        }
    }

    #[tracing::instrument(skip_all, fields(provider = %provider))]
    pub async fn ingest(
        &self,
        provider: PaymentProvider,
        body: &[u8],
        headers: &HeaderMap,
        source_ip: Option<String>,
    ) -> Result<IngestOutcome, IngestError> {
        let adapter = self
            .providers
            .get(provider)
            .ok_or(IngestError::UnknownProvider(provider))?;

        if let Err(e) = adapter.verify_webhook(body, headers) {
            return Err(match e {
                ProviderError::Auth(reason) => {
                    warn!(
                        order_id = %order_hint(body),
                        callback_token = %headers
                            .get(CALLBACK_TOKEN_HEADER)
                            .and_then(|v| v.to_str().ok())
                            .map(mask_secret)
                            .unwrap_or_default(),
                        reason = %reason,
                        "Rejected webhook with invalid credentials"
                    );
                    IngestError::Auth(reason)
                }
                other => IngestError::Validation(other.to_string()),
            });
        }

        let webhook = adapter
            .parse_webhook(body)
            .map_err(|e| IngestError::Validation(e.to_string()))?;

        let log = WebhookLog::new(
            provider,
            webhook.order_id.as_str(),
            webhook.transaction_id.as_str(),
            headers,
            webhook.raw_payload.clone(),
            source_ip,
        );
        if let Err(e) = self.store.record_webhook(log).await {
            warn!(order_id = %webhook.order_id, error = %e, "Failed to record webhook");
        }

        let key = idempotency_key(provider, &webhook.order_id, &webhook.transaction_id);
        let claimed = match self
            .idempotency
            .set_if_absent(&key, CLAIM_VALUE, self.config.idempotency_ttl)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                info!(key = %key, "Duplicate webhook ignored");
                return Ok(IngestOutcome::Duplicate);
            }
            Err(e) if self.config.fail_closed => {
                error!(key = %key, error = %e, "Idempotency store unavailable, rejecting webhook");
                return Err(IngestError::Transient(e.to_string()));
            }
            Err(e) => {
                warn!(
                    key = %key,
                    error = %e,
                    "Idempotency store unavailable, processing without duplicate protection"
                );
                false
            }
        };

        self.reconcile(webhook, &key, claimed).await
    }

    async fn reconcile(
        &self,
        webhook: CanonicalWebhook,
        key: &str,
        claimed: bool,
    ) -> Result<IngestOutcome, IngestError> {
        match self.engine.process(webhook).await {
            Ok(ReconcileOutcome::NotFound) => Ok(IngestOutcome::NotFound),
            Ok(outcome) => Ok(IngestOutcome::Processed(outcome)),
            Err(e) => {
                // A store failure happens before anything is committed; free the
                // key so the provider's retry is processed.
                if claimed
                    && matches!(e, ReconcileError::Store(_))
                    && let Err(release) = self.idempotency.release(key).await
                {
                    warn!(key = %key, error = %release, "Failed to release idempotency claim");
                }
                Err(IngestError::Processing(e))
            }
        }
    }
}

/// Order id for logging a payload that failed authentication.
fn order_hint(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("order_id")
                .or_else(|| v.get("external_id"))
                .and_then(|id| id.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Donation, DonationStatus, Payment, PaymentStatus};
    use crate::processors::EventPublisher;
    use crate::providers::{MidtransConfig, MidtransProvider, XenditConfig, XenditProvider};
    use crate::realtime::{ConnectionHub, HubConfig, HubHandle};
    use crate::events::outbound_channel;
    use crate::processors::DistributionBridge;
    use crate::store::{MemoryBroker, MemoryDonationStore, MemoryIdempotencyStore};
    use reveegate_sdk::objects::{WsEnvelope, WsMessageKind};
    use reveegate_sdk::signature::midtrans_signature;
    use tokio::time::timeout;
    use uuid::Uuid;

    const SERVER_KEY: &str = "SB-Mid-server-test";
    const XENDIT_TOKEN: &str = "xnd-callback-token";

    struct Pipeline {
        ingress: WebhookIngress,
        store: Arc<MemoryDonationStore>,
        idempotency: Arc<MemoryIdempotencyStore>,
        broker: Arc<MemoryBroker>,
        midtrans_payment: Payment,
        xendit_payment: Payment,
    }

    async fn pipeline(config: IngressConfig) -> Pipeline {
        let store = Arc::new(MemoryDonationStore::new());
        let idempotency = Arc::new(MemoryIdempotencyStore::new());
        let broker = Arc::new(MemoryBroker::new());

        let donation = Donation::new("Budi", Some("semangat!".into()), 50_000);
        let midtrans_payment =
            Payment::new(donation.id, PaymentProvider::Midtrans, "DON-abc", "qris", 50_000);
        store.insert(midtrans_payment.clone(), donation).await;

        let donation = Donation::new("Sari", None, 75_000);
        let xendit_payment =
            Payment::new(donation.id, PaymentProvider::Xendit, "DON-xyz", "ewallet", 75_000);
        store.insert(xendit_payment.clone(), donation).await;

        let providers = ProviderRegistry::new()
            .with(Arc::new(MidtransProvider::new(MidtransConfig {
                server_key: SERVER_KEY.into(),
                is_production: false,
                base_url: None,
            })))
            .with(Arc::new(XenditProvider::new(XenditConfig {
                webhook_token: XENDIT_TOKEN.into(),
                secret_key: "xnd_development_key".into(),
                base_url: None,
            })));
        let engine = ReconciliationEngine::new(
            store.clone(),
            EventPublisher::new(broker.clone()),
            providers.clone(),
        );
        let ingress = WebhookIngress::new(providers, idempotency.clone(), store.clone(), engine, config);
        Pipeline {
            ingress,
            store,
            idempotency,
            broker,
            midtrans_payment,
            xendit_payment,
        }
    }

    fn midtrans_body(signature: &str) -> Vec<u8> {
        serde_json::json!({
            "order_id": "DON-abc",
            "transaction_id": "tx-1",
            "transaction_status": "settlement",
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

    fn signed_midtrans_body() -> Vec<u8> {
        midtrans_body(&midtrans_signature("DON-abc", "200", "50000.00", SERVER_KEY))
    }

    fn xendit_body() -> Vec<u8> {
        br#"{"id":"inv-1","external_id":"DON-xyz","status":"PAID","amount":75000,"paid_at":"2024-01-15T10:30:00.000Z"}"#.to_vec()
    }

    fn xendit_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CALLBACK_TOKEN_HEADER, token.parse().unwrap());
        headers
    }

    async fn spawn_feed(broker: Arc<MemoryBroker>) -> HubHandle {
        let (hub, handle) = ConnectionHub::new(HubConfig::default());
        tokio::spawn(hub.run());
        tokio::spawn(DistributionBridge::new(broker.clone(), handle.clone()).run());
        timeout(Duration::from_secs(2), async {
            while broker.subscriber_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        handle
    }

    #[tokio::test]
    async fn signed_settlement_reaches_overlays_once() {
        let p = pipeline(IngressConfig::default()).await;
        let hub = spawn_feed(p.broker.clone()).await;
        let (tx, mut overlay) = outbound_channel(16);
        hub.register(Uuid::new_v4(), "overlay:T1".into(), tx).await.unwrap();

        let body = signed_midtrans_body();
        let outcome = p
            .ingress
            .ingest(PaymentProvider::Midtrans, &body, &HeaderMap::new(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Processed(ref o) if o.changed()));

        let payment = p.store.payment(p.midtrans_payment.id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        let donation = p.store.donation(payment.donation_id).await.unwrap();
        assert_eq!(donation.status, DonationStatus::Completed);

        let frame = timeout(Duration::from_secs(2), overlay.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope: WsEnvelope = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope.kind, WsMessageKind::Donation);
        assert_eq!(envelope.data.unwrap()["id"], donation.id.to_string());

        // Verbatim replay.
        let outcome = p
            .ingress
            .ingest(PaymentProvider::Midtrans, &body, &HeaderMap::new(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Duplicate));
        assert!(
            timeout(Duration::from_millis(200), overlay.recv()).await.is_err(),
            "replay must not broadcast again"
        );
        assert_eq!(p.store.webhook_logs().await.len(), 2);
    }

    #[tokio::test]
    async fn bad_signature_writes_nothing() {
        let p = pipeline(IngressConfig::default()).await;
        let result = p
            .ingress
            .ingest(PaymentProvider::Midtrans, &midtrans_body("deadbeef"), &HeaderMap::new(), None)
            .await;
        assert!(matches!(result, Err(IngestError::Auth(SignatureError::Mismatch))));
        assert!(!p.idempotency.contains("webhook:midtrans:DON-abc:tx-1").await);
        assert!(p.store.webhook_logs().await.is_empty());

        // A corrected retry still goes through.
        let outcome = p
            .ingress
            .ingest(PaymentProvider::Midtrans, &signed_midtrans_body(), &HeaderMap::new(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Processed(_)));
    }

    #[tokio::test]
    async fn xendit_token_is_checked() {
        let p = pipeline(IngressConfig::default()).await;
        let result = p
            .ingress
            .ingest(PaymentProvider::Xendit, &xendit_body(), &xendit_headers("wrong"), None)
            .await;
        assert!(matches!(result, Err(IngestError::Auth(_))));
        assert_eq!(
            p.store.payment(p.xendit_payment.id).await.unwrap().status,
            PaymentStatus::Pending
        );

        let outcome = p
            .ingress
            .ingest(
                PaymentProvider::Xendit,
                &xendit_body(),
                &xendit_headers(XENDIT_TOKEN),
                Some("203.0.113.7".into()),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Processed(_)));
        assert_eq!(
            p.store.payment(p.xendit_payment.id).await.unwrap().status,
            PaymentStatus::Paid
        );
        let logs = p.store.webhook_logs().await;
        assert_eq!(logs[0].headers[CALLBACK_TOKEN_HEADER], "[MASKED]");
        assert_eq!(logs[0].source_ip.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn malformed_payload_is_a_validation_error() {
        let p = pipeline(IngressConfig::default()).await;
        let result = p
            .ingress
            .ingest(PaymentProvider::Midtrans, b"{not json", &HeaderMap::new(), None)
            .await;
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_order_is_acknowledged_as_not_found() {
        let p = pipeline(IngressConfig::default()).await;
        let body = serde_json::json!({
            "order_id": "DON-missing",
            "transaction_id": "tx-9",
            "transaction_status": "settlement",
            "status_code": "200",
            "gross_amount": "10000.00",
            "signature_key": midtrans_signature("DON-missing", "200", "10000.00", SERVER_KEY),
        })
        .to_string();
        let outcome = p
            .ingress
            .ingest(PaymentProvider::Midtrans, body.as_bytes(), &HeaderMap::new(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::NotFound));
    }

    #[tokio::test]
    async fn idempotency_outage_fails_open_by_default() {
        let p = pipeline(IngressConfig::default()).await;
        p.idempotency.set_unavailable(true);
        let outcome = p
            .ingress
            .ingest(PaymentProvider::Midtrans, &signed_midtrans_body(), &HeaderMap::new(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Processed(_)));
    }

    #[tokio::test]
    async fn idempotency_outage_can_fail_closed() {
        let p = pipeline(IngressConfig {
            fail_closed: true,
            ..IngressConfig::default()
        })
        .await;
        p.idempotency.set_unavailable(true);
        let result = p
            .ingress
            .ingest(PaymentProvider::Midtrans, &signed_midtrans_body(), &HeaderMap::new(), None)
            .await;
        assert!(matches!(result, Err(IngestError::Transient(_))));
        assert_eq!(
            p.store.payment(p.midtrans_payment.id).await.unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn store_failure_releases_claim() {
        let p = pipeline(IngressConfig::default()).await;
        p.store.set_unavailable(true);
        let result = p
            .ingress
            .ingest(PaymentProvider::Midtrans, &signed_midtrans_body(), &HeaderMap::new(), None)
            .await;
        assert!(matches!(result, Err(IngestError::Processing(ReconcileError::Store(_)))));
        assert!(!p.idempotency.contains("webhook:midtrans:DON-abc:tx-1").await);

        p.store.set_unavailable(false);
        let outcome = p
            .ingress
            .ingest(PaymentProvider::Midtrans, &signed_midtrans_body(), &HeaderMap::new(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Processed(_)));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_rejected() {
        let p = pipeline(IngressConfig::default()).await;
        let bare = WebhookIngress::new(
            ProviderRegistry::new(),
            p.idempotency.clone(),
            p.store.clone(),
            p.ingress.engine.clone(),
            IngressConfig::default(),
        );
        assert!(matches!(
            bare.ingest(PaymentProvider::Xendit, &xendit_body(), &HeaderMap::new(), None).await,
            Err(IngestError::UnknownProvider(PaymentProvider::Xendit))
        ));
    }
}
