pub mod donation;
pub mod payment;
pub mod webhook_log;

pub use donation::{Donation, GetDonationById};
pub use payment::{GetPaymentByExternalId, GetPaymentById, Payment, PersistTransition};
pub use webhook_log::{InsertWebhookLog, WebhookLog};

use reveegate_sdk::objects as sdk;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "payment_provider")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Midtrans,
    Xendit,
}

impl From<sdk::Provider> for PaymentProvider {
    fn from(value: sdk::Provider) -> Self {
        match value {
            sdk::Provider::Midtrans => PaymentProvider::Midtrans,
            sdk::Provider::Xendit => PaymentProvider::Xendit,
        }
    }
}

impl From<PaymentProvider> for sdk::Provider {
    fn from(value: PaymentProvider) -> Self {
        match value {
            PaymentProvider::Midtrans => sdk::Provider::Midtrans,
            PaymentProvider::Xendit => sdk::Provider::Xendit,
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        sdk::Provider::from(*self).fmt(f)
    }
}

/// Settlement state of a payment.
///
/// `Paid` and `Refunded` are terminal: no webhook or manual override moves
/// a payment out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "payment_status")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Expired,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Refunded)
    }

    /// Donation status mirrored from this payment status.
    pub const fn donation_status(&self) -> Option<DonationStatus> {
        match self {
            PaymentStatus::Pending => None,
            PaymentStatus::Paid => Some(DonationStatus::Completed),
            PaymentStatus::Expired => Some(DonationStatus::Expired),
            PaymentStatus::Failed => Some(DonationStatus::Failed),
            PaymentStatus::Refunded => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

impl From<PaymentStatus> for sdk::PaymentStatus {
    fn from(value: PaymentStatus) -> Self {
        match value {
            PaymentStatus::Pending => sdk::PaymentStatus::Pending,
            PaymentStatus::Paid => sdk::PaymentStatus::Paid,
            PaymentStatus::Expired => sdk::PaymentStatus::Expired,
            PaymentStatus::Failed => sdk::PaymentStatus::Failed,
            PaymentStatus::Refunded => sdk::PaymentStatus::Refunded,
        }
    }
}

impl From<sdk::ManualStatus> for PaymentStatus {
    fn from(value: sdk::ManualStatus) -> Self {
        match value {
            sdk::ManualStatus::Paid => PaymentStatus::Paid,
            sdk::ManualStatus::Failed => PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "donation_status")]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Completed,
    Expired,
    Failed,
    Cancelled,
}

impl From<DonationStatus> for sdk::DonationStatus {
    fn from(value: DonationStatus) -> Self {
        match value {
            DonationStatus::Pending => sdk::DonationStatus::Pending,
            DonationStatus::Completed => sdk::DonationStatus::Completed,
            DonationStatus::Expired => sdk::DonationStatus::Expired,
            DonationStatus::Failed => sdk::DonationStatus::Failed,
            DonationStatus::Cancelled => sdk::DonationStatus::Cancelled,
        }
    }
}
