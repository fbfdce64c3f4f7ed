use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::models::AlertError;

/// Generic key/value sink with TTL, used to externalize alerts for
/// out-of-process inspection. Persistence is best-effort by contract:
/// callers log failures and carry on.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl_seconds: u64,
    ) -> anyhow::Result<()>;
}

pub struct RedisAlertSink {
    pool: Pool,
}

impl RedisAlertSink {
    pub async fn new(redis_url: &str) -> Result<Self, AlertError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| AlertError::PersistenceError(format!("pool creation failed: {}", e)))?;

        // Verify connectivity up front so a misconfigured URL fails loudly
        // at startup instead of on the first alert.
        let mut conn = pool
            .get()
            .await
            .map_err(|e| AlertError::PersistenceError(format!("redis connect failed: {}", e)))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AlertError::PersistenceError(format!("redis ping failed: {}", e)))?;

        info!("redis alert sink initialized");
        Ok(Self { pool })
    }
}

#[async_trait]
impl AlertSink for RedisAlertSink {
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl_seconds: u64,
    ) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        let payload = serde_json::to_string(&value)?;
        let _: () = conn.set_ex(key, payload, ttl_seconds).await?;
        debug!(key, ttl_seconds, "persisted alert");
        Ok(())
    }
}
