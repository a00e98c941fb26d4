use async_trait::async_trait;
use kanau::processor::Processor;
use uuid::Uuid;

use super::{DonationStore, StoreError};
use crate::entities::{
    Donation, GetDonationById, GetPaymentByExternalId, GetPaymentById, InsertWebhookLog, Payment,
    PaymentProvider, PersistTransition, WebhookLog,
};
use crate::framework::DatabaseProcessor;

/// [`DonationStore`] backed by Postgres.
#[derive(Clone)]
pub struct PgDonationStore {
    db: DatabaseProcessor,
}

impl PgDonationStore {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DonationStore for PgDonationStore {
    async fn payment_by_external_id(
        &self,
        provider: PaymentProvider,
        external_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let query = GetPaymentByExternalId {
            provider,
            external_id: external_id.to_string(),
        };
        Ok(self.db.process(query).await?)
    }

    async fn payment_by_id(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.db.process(GetPaymentById { id }).await?)
    }

    async fn donation_by_id(&self, id: Uuid) -> Result<Option<Donation>, StoreError> {
        Ok(self.db.process(GetDonationById { id }).await?)
    }

    async fn persist_transition(
        &self,
        payment: &Payment,
        donation: &Donation,
    ) -> Result<bool, StoreError> {
        let write = PersistTransition {
            payment: payment.clone(),
            donation: donation.clone(),
        };
        Ok(self.db.process(write).await?)
    }

    async fn record_webhook(&self, log: WebhookLog) -> Result<(), StoreError> {
        Ok(self.db.process(InsertWebhookLog { log }).await?)
    }
}
