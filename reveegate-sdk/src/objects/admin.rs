use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DonationStatus, PaymentStatus};

/// Minimum length of a manual reconciliation reason.
pub const MIN_RECONCILE_REASON_LEN: usize = 10;

/// Target status of a manual reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualStatus {
    Paid,
    Failed,
}

/// `POST /api/v1/admin/reconcile` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub payment_id: Uuid,
    pub status: ManualStatus,
    pub reason: String,
}

/// Result of a manual reconciliation or provider sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub payment_id: Uuid,
    pub donation_id: Uuid,
    pub payment_status: PaymentStatus,
    pub donation_status: DonationStatus,
    /// `false` when the payment was already in a terminal state.
    pub changed: bool,
}

/// `POST /api/v1/admin/payments/{payment_id}/sync` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Status reported by the provider.
    pub provider_status: PaymentStatus,
    #[serde(flatten)]
    pub result: ReconcileResponse,
}

/// Connection hub snapshot, `GET /api/v1/admin/realtime/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    pub total_clients: usize,
    pub total_channels: usize,
    pub channels: BTreeMap<String, usize>,
}
