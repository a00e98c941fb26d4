//! Redis-backed idempotency claims and donation topic.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::Pool;
use deadpool_redis::redis::{self, AsyncCommands};
use futures_util::StreamExt;

use super::{Broker, BrokerError, BrokerStream, IdempotencyError, IdempotencyStore};

#[derive(Clone)]
pub struct RedisIdempotencyStore {
    pool: Pool,
}

impl RedisIdempotencyStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn unavailable(e: impl std::fmt::Display) -> IdempotencyError {
    IdempotencyError::Unavailable(e.to_string())
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, IdempotencyError> {
        let mut conn = self.pool.get().await.map_err(unavailable)?;
        // `SET key value NX EX ttl` replies OK when set and nil otherwise.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str) -> Result<(), IdempotencyError> {
        let mut conn = self.pool.get().await.map_err(unavailable)?;
        let _: i64 = conn.del(key).await.map_err(unavailable)?;
        Ok(())
    }
}

/// Redis pub/sub broker.
///
/// Publishing goes through the pool; every subscription opens a dedicated
/// connection since a subscribed connection cannot issue other commands.
#[derive(Clone)]
pub struct RedisBroker {
    pool: Pool,
    client: redis::Client,
}

impl RedisBroker {
    pub fn new(pool: Pool, client: redis::Client) -> Self {
        Self { pool, client }
    }
}

fn broker_unavailable(e: impl std::fmt::Display) -> BrokerError {
    BrokerError::Unavailable(e.to_string())
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        let mut conn = self.pool.get().await.map_err(broker_unavailable)?;
        let _receivers: i64 = conn
            .publish(topic, payload.as_ref())
            .await
            .map_err(broker_unavailable)?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BrokerStream, BrokerError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(broker_unavailable)?;
        pubsub.subscribe(topic).await.map_err(broker_unavailable)?;
        let stream = pubsub
            .into_on_message()
            .map(|msg| Ok(Bytes::copy_from_slice(msg.get_payload_bytes())));
        Ok(stream.boxed())
    }
}
