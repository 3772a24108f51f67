//! Redis implementation of the job store

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{JobStore, Queue};
use crate::error::StoreResult;

/// Job store backed by a Redis server
///
/// Field and list operations share one auto-reconnecting connection.
/// `claim` blocks on the server, so every call opens its own connection
/// rather than stalling the shared one.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    claim_timeout: Duration,
}

impl RedisStore {
    /// Connects to the store
    ///
    /// # Arguments
    /// * `url` - Redis URL (e.g., "redis://redis/0")
    /// * `claim_timeout` - How long one blocking pop waits before it is reissued
    pub async fn connect(url: &str, claim_timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;

        info!("Connected to job store at {}", url);

        Ok(Self {
            client,
            conn,
            claim_timeout,
        })
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn claim(&self) -> StoreResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let timeout = self.claim_timeout.as_secs().max(1);

        loop {
            let key: Option<String> = redis::cmd("BRPOPLPUSH")
                .arg(Queue::Submit.key())
                .arg(Queue::Running.key())
                .arg(timeout)
                .query_async(&mut conn)
                .await?;

            match key {
                Some(key) => return Ok(key),
                None => debug!("No job submitted within {}s", timeout),
            }
        }
    }

    async fn get_field(&self, key: &str, name: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(key, name).await?;
        Ok(value)
    }

    async fn get_fields(&self, key: &str, names: &[&str]) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(names)
            .query_async(&mut conn)
            .await?;

        Ok(names
            .iter()
            .zip(values)
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect())
    }

    async fn set_field(&self, key: &str, name: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let () = conn.hset(key, name, value).await?;
        Ok(())
    }

    async fn set_fields(&self, key: &str, values: &[(String, String)]) -> StoreResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let () = conn.hset_multiple(key, values).await?;
        Ok(())
    }

    async fn requeue_to_done(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let () = redis::pipe()
            .atomic()
            .lrem(Queue::Running.key(), 1, key)
            .ignore()
            .lpush(Queue::Done.key(), key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list(&self, queue: Queue) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.lrange(queue.key(), 0, -1).await?;
        Ok(keys)
    }
}
