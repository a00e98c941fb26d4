//! Admin API handlers.
//!
//! Every endpoint requires an admin JWT (see [`AdminAuth`]).

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kanau::processor::Processor;
use reveegate_core::processors::{ManualReconcile, ReconcileError, SyncWithProvider};
use reveegate_sdk::objects::{HubStats, ReconcileRequest, ReconcileResponse, SyncResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /api/v1/admin/reconcile
// ---------------------------------------------------------------------------

/// `POST /api/v1/admin/reconcile`: settle or fail a pending payment by hand.
///
/// The acting admin is taken from the token's `sub` claim and written to
/// the payment's audit metadata.
pub(super) async fn reconcile(
    state: State<AppState>,
    AdminAuth(identity): AdminAuth,
    Json(body): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>, AdminApiError> {
    let outcome = state
        .engine
        .process(ManualReconcile {
            payment_id: body.payment_id,
            status: body.status,
            reason: body.reason,
            admin_id: identity.subject,
        })
        .await?;
    outcome
        .response()
        .map(Json)
        .ok_or(AdminApiError::NotFound(body.payment_id))
}

// ---------------------------------------------------------------------------
// POST /api/v1/admin/payments/{payment_id}/sync
// ---------------------------------------------------------------------------

/// `POST /api/v1/admin/payments/{payment_id}/sync`: poll the provider and
/// apply whatever it reports.
pub(super) async fn sync_payment(
    state: State<AppState>,
    _admin: AdminAuth,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<SyncResponse>, AdminApiError> {
    let synced = state.engine.process(SyncWithProvider { payment_id }).await?;
    let result = synced
        .outcome
        .response()
        .ok_or(AdminApiError::NotFound(payment_id))?;
    Ok(Json(SyncResponse {
        provider_status: synced.provider_status.into(),
        result,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/admin/realtime/stats
// ---------------------------------------------------------------------------

pub(super) async fn realtime_stats(state: State<AppState>, _admin: AdminAuth) -> Json<HubStats> {
    Json(state.hub.stats().await)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub(super) enum AdminApiError {
    #[error("payment {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminApiError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminApiError::Reconcile(e) => match e {
                ReconcileError::ReasonTooShort | ReconcileError::UnknownProvider(_) => {
                    StatusCode::BAD_REQUEST
                }
                ReconcileError::InvalidTransition { .. } => StatusCode::CONFLICT,
                ReconcileError::Provider(_) => {
                    tracing::error!(error = %e, "Admin API: provider request failed");
                    StatusCode::BAD_GATEWAY
                }
                ReconcileError::Store(_) | ReconcileError::DonationMissing(_) => {
                    tracing::error!(error = %e, "Admin API: internal error");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        };
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}
