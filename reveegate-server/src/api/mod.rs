//! HTTP and WebSocket API.
//!
//! # Endpoints
//!
//! - `POST /api/v1/webhooks/midtrans`                  – Midtrans payment notification
//! - `POST /api/v1/webhooks/xendit`                    – Xendit invoice callback
//! - `GET  /ws/overlay?token=…`                        – overlay donation feed
//! - `GET  /ws/admin`                                  – admin dashboard feed (JWT)
//! - `POST /api/v1/admin/reconcile`                    – manual settle / fail
//! - `POST /api/v1/admin/payments/{payment_id}/sync`   – pull status from the provider
//! - `GET  /api/v1/admin/realtime/stats`               – connection hub snapshot

mod admin;
pub mod extractors;
mod webhook;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/webhooks/midtrans", post(webhook::midtrans_webhook))
        .route("/api/v1/webhooks/xendit", post(webhook::xendit_webhook))
        .route("/ws/overlay", get(ws::overlay_ws))
        .route("/ws/admin", get(ws::admin_ws))
        .route("/api/v1/admin/reconcile", post(admin::reconcile))
        .route(
            "/api/v1/admin/payments/{payment_id}/sync",
            post(admin::sync_payment),
        )
        .route("/api/v1/admin/realtime/stats", get(admin::realtime_stats))
}
