//! Provider callback handlers.
//!
//! Providers retry on anything but a 2xx, so every outcome except bad
//! credentials and malformed payloads is acknowledged with 200.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use reveegate_core::entities::PaymentProvider;
use reveegate_core::processors::{IngestError, IngestOutcome};
use reveegate_sdk::objects::WebhookAck;

use crate::api::extractors::SourceIp;
use crate::state::AppState;

/// `POST /api/v1/webhooks/midtrans`
pub async fn midtrans_webhook(
    state: State<AppState>,
    source_ip: SourceIp,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    ingest(state, PaymentProvider::Midtrans, source_ip, headers, body).await
}

/// `POST /api/v1/webhooks/xendit`
pub async fn xendit_webhook(
    state: State<AppState>,
    source_ip: SourceIp,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    ingest(state, PaymentProvider::Xendit, source_ip, headers, body).await
}

async fn ingest(
    State(state): State<AppState>,
    provider: PaymentProvider,
    SourceIp(source_ip): SourceIp,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.ingress.ingest(provider, &body, &headers, source_ip).await {
        Ok(IngestOutcome::Processed(_) | IngestOutcome::Duplicate | IngestOutcome::NotFound) => {
            (StatusCode::OK, Json(WebhookAck::ok())).into_response()
        }
        Err(e) => WebhookApiError(e).into_response(),
    }
}

struct WebhookApiError(IngestError);

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            IngestError::Auth(_) => (StatusCode::UNAUTHORIZED, "invalid signature".to_string()),
            IngestError::Validation(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            IngestError::Transient(_) => {
                tracing::error!(error = %self.0, "Webhook API: idempotency store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "temporarily unavailable".to_string(),
                )
            }
            IngestError::UnknownProvider(_) | IngestError::Processing(_) => {
                tracing::error!(error = %self.0, "Webhook API: processing failed");
                (StatusCode::OK, "processing failed".to_string())
            }
        };
        (status, Json(WebhookAck::error(message))).into_response()
    }
}
