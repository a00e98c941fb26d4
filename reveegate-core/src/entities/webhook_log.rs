use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use super::PaymentProvider;
use crate::framework::DatabaseProcessor;

/// Audit record of an authenticated provider callback.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WebhookLog {
    pub id: Uuid,
    pub provider: PaymentProvider,
    pub order_id: String,
    pub transaction_id: String,
    /// Request headers with credentials masked.
    pub headers: serde_json::Value,
    pub payload: serde_json::Value,
    pub source_ip: Option<String>,
    pub received_at: OffsetDateTime,
}

impl WebhookLog {
    pub fn new(
        provider: PaymentProvider,
        order_id: impl Into<String>,
        transaction_id: impl Into<String>,
        headers: &http::HeaderMap,
        payload: serde_json::Value,
        source_ip: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            provider,
            order_id: order_id.into(),
            transaction_id: transaction_id.into(),
            headers: masked_headers(headers),
            payload,
            source_ip,
            received_at: OffsetDateTime::now_utc(),
        }
    }
}

const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "cookie", "x-callback-token"];

fn masked_headers(headers: &http::HeaderMap) -> serde_json::Value {
    let map = headers
        .iter()
        .map(|(name, value)| {
            let value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "[MASKED]".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), serde_json::Value::String(value))
        })
        .collect();
    serde_json::Value::Object(map)
}

#[derive(Debug, Clone)]
pub struct InsertWebhookLog {
    pub log: WebhookLog,
}

impl Processor<InsertWebhookLog> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertWebhookLog")]
    async fn process(&self, insert: InsertWebhookLog) -> Result<(), sqlx::Error> {
        let log = insert.log;
        sqlx::query(
            r#"
            INSERT INTO webhook_logs
                (id, provider, order_id, transaction_id, headers, payload, source_ip, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.id)
        .bind(log.provider)
        .bind(log.order_id)
        .bind(log.transaction_id)
        .bind(log.headers)
        .bind(log.payload)
        .bind(log.source_ip)
        .bind(log.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
