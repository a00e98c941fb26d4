use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Donation, PaymentProvider, PaymentStatus};
use crate::framework::DatabaseProcessor;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub donation_id: Uuid,
    pub provider: PaymentProvider,
    /// Provider order id, unique per provider.
    pub external_id: String,
    pub payment_method: String,
    /// Minor currency units.
    pub amount: i64,
    pub status: PaymentStatus,
    pub qr_code_url: Option<String>,
    pub va_number: Option<String>,
    pub deep_link: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
    pub paid_at: Option<OffsetDateTime>,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Payment {
    pub fn new(
        donation_id: Uuid,
        provider: PaymentProvider,
        external_id: impl Into<String>,
        payment_method: impl Into<String>,
        amount: i64,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::now_v7(),
            donation_id,
            provider,
            external_id: external_id.into(),
            payment_method: payment_method.into(),
            amount,
            status: PaymentStatus::Pending,
            qr_code_url: None,
            va_number: None,
            deep_link: None,
            expires_at: None,
            paid_at: None,
            metadata: serde_json::Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a metadata key, replacing a non-object metadata value.
    pub fn annotate(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        if !self.metadata.is_object() {
            self.metadata = serde_json::Value::Object(Default::default());
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
    }
}

const PAYMENT_COLUMNS: &str = "id, donation_id, provider, external_id, payment_method, amount, \
    status, qr_code_url, va_number, deep_link, expires_at, paid_at, metadata, created_at, updated_at";

#[derive(Debug, Clone, Copy)]
pub struct GetPaymentById {
    pub id: Uuid,
}

impl Processor<GetPaymentById> for DatabaseProcessor {
    type Output = Option<Payment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPaymentById")]
    async fn process(&self, query: GetPaymentById) -> Result<Option<Payment>, sqlx::Error> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        sqlx::query_as::<_, Payment>(&sql)
            .bind(query.id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetPaymentByExternalId {
    pub provider: PaymentProvider,
    pub external_id: String,
}

impl Processor<GetPaymentByExternalId> for DatabaseProcessor {
    type Output = Option<Payment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPaymentByExternalId")]
    async fn process(&self, query: GetPaymentByExternalId) -> Result<Option<Payment>, sqlx::Error> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider = $1 AND external_id = $2"
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(query.provider)
            .bind(&query.external_id)
            .fetch_optional(&self.pool)
            .await
    }
}

/// Write a payment and its donation in one transaction.
///
/// The payment update only applies while the stored row is not in a terminal
/// state, so a concurrent writer can never move a paid payment. Output is
/// `false` when that guard rejected the update; nothing is written then.
#[derive(Debug, Clone)]
pub struct PersistTransition {
    pub payment: Payment,
    pub donation: Donation,
}

impl Processor<PersistTransition> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:PersistTransition")]
    async fn process(&self, write: PersistTransition) -> Result<bool, sqlx::Error> {
        let mut tx = self.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, paid_at = $3, metadata = $4, updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('paid', 'refunded')
            "#,
        )
        .bind(write.payment.id)
        .bind(write.payment.status)
        .bind(write.payment.paid_at)
        .bind(&write.payment.metadata)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE donations
            SET status = $2, paid_at = $3, metadata = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(write.donation.id)
        .bind(write.donation.status)
        .bind(write.donation.paid_at)
        .bind(&write.donation.metadata)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
