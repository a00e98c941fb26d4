//! ReconciliationEngine processor.
//!
//! The ReconciliationEngine is responsible for:
//! - Applying provider-reported statuses to a Payment (webhooks and polling)
//! - Applying manual admin overrides with an audit trail in metadata
//! - Mirroring every Payment transition onto its Donation
//! - Publishing a `DonationEvent` when a Payment becomes `paid`
//!
//! `paid` and `refunded` are terminal. Persistence of both rows is atomic
//! and guarded against regressing a terminal payment.

use std::sync::Arc;

use kanau::processor::Processor;
use reveegate_sdk::objects::{MIN_RECONCILE_REASON_LEN, ManualStatus, ReconcileResponse};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::publisher::EventPublisher;
use crate::entities::{Donation, Payment, PaymentProvider, PaymentStatus};
use crate::providers::{CanonicalWebhook, ProviderError, ProviderRegistry};
use crate::store::{DonationStore, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("donation {0} referenced by payment is missing")]
    DonationMissing(Uuid),
    #[error("cannot move payment from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("reason must be at least {} characters", MIN_RECONCILE_REASON_LEN)]
    ReasonTooShort,
    #[error("provider {0} is not configured")]
    UnknownProvider(PaymentProvider),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No payment matches the reference.
    NotFound,
    /// The report did not move the payment.
    Unchanged { payment: Payment, donation: Donation },
    Transitioned {
        payment: Payment,
        donation: Donation,
        /// Whether the `DonationEvent` reached the broker.
        event_published: bool,
    },
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, ReconcileOutcome::Transitioned { .. })
    }

    pub fn response(&self) -> Option<ReconcileResponse> {
        let (payment, donation) = match self {
            ReconcileOutcome::NotFound => return None,
            ReconcileOutcome::Unchanged { payment, donation }
            | ReconcileOutcome::Transitioned {
                payment, donation, ..
            } => (payment, donation),
        };
        Some(ReconcileResponse {
            payment_id: payment.id,
            donation_id: donation.id,
            payment_status: payment.status.into(),
            donation_status: donation.status.into(),
            changed: self.changed(),
        })
    }
}

/// Admin override of a pending payment.
#[derive(Debug, Clone)]
pub struct ManualReconcile {
    pub payment_id: Uuid,
    pub status: ManualStatus,
    pub reason: String,
    /// Subject of the admin token.
    pub admin_id: String,
}

/// Poll the provider for a payment's status and apply it.
#[derive(Debug, Clone, Copy)]
pub struct SyncWithProvider {
    pub payment_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub provider_status: PaymentStatus,
    pub outcome: ReconcileOutcome,
}

/// Target of a provider-reported status, `None` when it is a no-op.
///
/// A `paid` report on an expired or failed payment is applied: the money was
/// received after the payment was given up on.
pub fn reported_transition(current: PaymentStatus, reported: PaymentStatus) -> Option<PaymentStatus> {
    use PaymentStatus::*;
    match (current, reported) {
        (Paid | Refunded, _) => None,
        (_, Pending | Refunded) => None,
        (Pending, to) => Some(to),
        (Expired | Failed, Paid) => Some(Paid),
        _ => None,
    }
}

/// Target of a manual override, `None` when the payment is already paid.
pub fn manual_transition(
    current: PaymentStatus,
    requested: PaymentStatus,
) -> Result<Option<PaymentStatus>, ReconcileError> {
    match current {
        PaymentStatus::Pending => Ok(Some(requested)),
        PaymentStatus::Paid => Ok(None),
        from => Err(ReconcileError::InvalidTransition {
            from,
            to: requested,
        }),
    }
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn DonationStore>,
    publisher: EventPublisher,
    providers: ProviderRegistry,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn DonationStore>,
        publisher: EventPublisher,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            store,
            publisher,
            providers,
        }
    }

    async fn load_donation(&self, payment: &Payment) -> Result<Donation, ReconcileError> {
        self.store
            .donation_by_id(payment.donation_id)
            .await?
            .ok_or(ReconcileError::DonationMissing(payment.donation_id))
    }

    /// Move `payment` to `target`, mirror it onto `donation`, persist both and
    /// publish on settlement.
    async fn transition(
        &self,
        mut payment: Payment,
        mut donation: Donation,
        target: PaymentStatus,
        paid_at: Option<OffsetDateTime>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let now = OffsetDateTime::now_utc();
        let from = payment.status;

        payment.status = target;
        payment.updated_at = now;
        if let Some(status) = target.donation_status() {
            donation.status = status;
        }
        donation.updated_at = now;
        if target == PaymentStatus::Paid {
            let paid_at = paid_at.unwrap_or(now);
            payment.paid_at = Some(paid_at);
            donation.paid_at = Some(paid_at);
        }

        if !self.store.persist_transition(&payment, &donation).await? {
            info!(
                payment_id = %payment.id,
                "Payment reached a terminal state concurrently, transition skipped"
            );
            let payment = self
                .store
                .payment_by_id(payment.id)
                .await?
                .unwrap_or(payment);
            let donation = self.load_donation(&payment).await?;
            return Ok(ReconcileOutcome::Unchanged { payment, donation });
        }

        info!(
            payment_id = %payment.id,
            donation_id = %donation.id,
            order_id = %payment.external_id,
            from = %from,
            to = %target,
            "Payment transitioned"
        );

        let event_published = match donation.to_event() {
            Some(event) if target == PaymentStatus::Paid => {
                match self.publisher.publish(&event).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            donation_id = %donation.id,
                            error = %e,
                            "Failed to publish donation event, live notification lost"
                        );
                        false
                    }
                }
            }
            _ => false,
        };

        Ok(ReconcileOutcome::Transitioned {
            payment,
            donation,
            event_published,
        })
    }

    /// Shared path of webhooks and provider polling.
    async fn apply_report(
        &self,
        mut payment: Payment,
        reported: PaymentStatus,
        paid_at: Option<OffsetDateTime>,
        transaction_id: Option<&str>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let donation = self.load_donation(&payment).await?;

        let Some(target) = reported_transition(payment.status, reported) else {
            debug!(
                payment_id = %payment.id,
                current = %payment.status,
                reported = %reported,
                "Report does not change payment"
            );
            return Ok(ReconcileOutcome::Unchanged { payment, donation });
        };

        if let Some(transaction_id) = transaction_id {
            payment.annotate("provider_transaction_id", transaction_id);
        }
        self.transition(payment, donation, target, paid_at).await
    }
}

impl Processor<CanonicalWebhook> for ReconciliationEngine {
    type Output = ReconcileOutcome;
    type Error = ReconcileError;
    #[tracing::instrument(
        skip_all,
        err,
        name = "Reconcile:Webhook",
        fields(provider = %webhook.provider, order_id = %webhook.order_id)
    )]
    async fn process(&self, webhook: CanonicalWebhook) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(payment) = self
            .store
            .payment_by_external_id(webhook.provider, &webhook.order_id)
            .await?
        else {
            warn!("No payment matches webhook");
            return Ok(ReconcileOutcome::NotFound);
        };

        if let Some(gross_amount) = webhook.gross_amount
            && gross_amount != payment.amount
        {
            warn!(
                payment_id = %payment.id,
                expected = payment.amount,
                reported = gross_amount,
                "Webhook amount does not match payment"
            );
        }

        self.apply_report(
            payment,
            webhook.status,
            webhook.paid_at,
            Some(&webhook.transaction_id),
        )
        .await
    }
}

impl Processor<ManualReconcile> for ReconciliationEngine {
    type Output = ReconcileOutcome;
    type Error = ReconcileError;
    #[tracing::instrument(
        skip_all,
        err,
        name = "Reconcile:Manual",
        fields(payment_id = %request.payment_id, admin_id = %request.admin_id)
    )]
    async fn process(&self, request: ManualReconcile) -> Result<ReconcileOutcome, ReconcileError> {
        let reason = request.reason.trim();
        if reason.chars().count() < MIN_RECONCILE_REASON_LEN {
            return Err(ReconcileError::ReasonTooShort);
        }

        let Some(mut payment) = self.store.payment_by_id(request.payment_id).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };
        let requested = PaymentStatus::from(request.status);
        let Some(target) = manual_transition(payment.status, requested)? else {
            let donation = self.load_donation(&payment).await?;
            return Ok(ReconcileOutcome::Unchanged { payment, donation });
        };
        let donation = self.load_donation(&payment).await?;

        let now = OffsetDateTime::now_utc();
        payment.annotate("reconciliation_reason", reason);
        payment.annotate("reconciled_by", request.admin_id.as_str());
        if let Ok(at) = now.format(&Rfc3339) {
            payment.annotate("reconciliation_at", at);
        }

        info!(reason = %reason, to = %target, "Manual reconciliation");
        self.transition(payment, donation, target, Some(now)).await
    }
}

impl Processor<SyncWithProvider> for ReconciliationEngine {
    type Output = SyncOutcome;
    type Error = ReconcileError;
    #[tracing::instrument(
        skip_all,
        err,
        name = "Reconcile:Sync",
        fields(payment_id = %request.payment_id)
    )]
    async fn process(&self, request: SyncWithProvider) -> Result<SyncOutcome, ReconcileError> {
        let Some(payment) = self.store.payment_by_id(request.payment_id).await? else {
            return Ok(SyncOutcome {
                provider_status: PaymentStatus::Pending,
                outcome: ReconcileOutcome::NotFound,
            });
        };
        let provider = self
            .providers
            .get(payment.provider)
            .ok_or(ReconcileError::UnknownProvider(payment.provider))?;

        let status = provider.get_status(&payment.external_id).await?;
        debug!(
            order_id = %payment.external_id,
            provider_status = %status.status,
            "Provider status fetched"
        );

        let outcome = self
            .apply_report(
                payment,
                status.status,
                status.paid_at,
                status.transaction_id.as_deref(),
            )
            .await?;
        Ok(SyncOutcome {
            provider_status: status.status,
            outcome,
        })
    }
}
