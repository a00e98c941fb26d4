//! Notification pipeline processors.
//!
//! - `WebhookIngress`: authenticates and deduplicates provider callbacks,
//!   hands them to reconciliation
//! - `ReconciliationEngine`: applies payment transitions, mirrors them onto
//!   the donation and publishes `DonationEvent` on settlement
//! - `EventPublisher`: serializes `DonationEvent` onto the broker
//! - `DistributionBridge`: broker subscription feeding hub broadcasts

pub mod bridge;
pub mod ingress;
pub mod publisher;
pub mod reconciliation;

pub use bridge::DistributionBridge;
pub use ingress::{IngestError, IngestOutcome, IngressConfig, WebhookIngress};
pub use publisher::{EventPublisher, PublishError};
pub use reconciliation::{
    ManualReconcile, ReconcileError, ReconcileOutcome, ReconciliationEngine, SyncOutcome,
    SyncWithProvider,
};
