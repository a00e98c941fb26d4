use kanau::processor::Processor;
use reveegate_sdk::objects::DonationEvent;
use time::OffsetDateTime;
use uuid::Uuid;

use super::DonationStatus;
use crate::framework::DatabaseProcessor;

/// Donor display name used when the donor left the field empty.
pub const ANONYMOUS_DONOR: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Donation {
    pub id: Uuid,
    pub donor_name: String,
    pub donor_email: Option<String>,
    pub message: Option<String>,
    /// Minor currency units.
    pub amount: i64,
    pub status: DonationStatus,
    pub metadata: serde_json::Value,
    pub paid_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Donation {
    pub fn new(donor_name: &str, message: Option<String>, amount: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        let donor_name = if donor_name.trim().is_empty() {
            ANONYMOUS_DONOR.to_string()
        } else {
            donor_name.to_string()
        };
        Self {
            id: Uuid::now_v7(),
            donor_name,
            donor_email: None,
            message,
            amount,
            status: DonationStatus::Pending,
            metadata: serde_json::Value::Object(Default::default()),
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Broker event for a completed donation; `None` before settlement.
    pub fn to_event(&self) -> Option<DonationEvent> {
        if self.status != DonationStatus::Completed {
            return None;
        }
        let paid_at = self.paid_at?;
        Some(DonationEvent::new(
            self.id,
            self.donor_name.clone(),
            self.message.clone().unwrap_or_default(),
            self.amount,
            paid_at,
        ))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GetDonationById {
    pub id: Uuid,
}

impl Processor<GetDonationById> for DatabaseProcessor {
    type Output = Option<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDonationById")]
    async fn process(&self, query: GetDonationById) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(
            r#"
            SELECT id, donor_name, donor_email, message, amount, status,
                   metadata, paid_at, created_at, updated_at
            FROM donations
            WHERE id = $1
            "#,
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}
