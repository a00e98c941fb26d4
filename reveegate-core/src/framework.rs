use sqlx::PgPool;

/// Executes entity queries against the connection pool.
///
/// Each query is a small struct with a `Processor` impl on this type, so
/// call sites read as `db.process(GetPaymentById { id }).await`.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, sqlx::Error> {
        self.pool.begin().await
    }
}
