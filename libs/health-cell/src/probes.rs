use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures::future::BoxFuture;
use tracing::debug;

use crate::models::ProbeOutcome;

/// Async health probe contract. Each monitored dependency supplies one;
/// the registry never contains service-specific protocol logic itself.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}

/// HTTP GET probe for external APIs. 2xx is healthy; anything else carries
/// the status code as the error.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self) -> ProbeOutcome {
        let started = Instant::now();
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let elapsed = started.elapsed().as_millis() as u64;
                let code = response.status();
                debug!(url = %self.url, status = %code, elapsed_ms = elapsed, "http probe completed");

                let mut outcome = ProbeOutcome {
                    response_time_ms: Some(elapsed),
                    ..Default::default()
                }
                .with_detail("status_code", serde_json::json!(code.as_u16()));

                if !code.is_success() {
                    outcome.error = Some(format!("unexpected status code: {}", code));
                }
                outcome
            }
            Err(e) => ProbeOutcome::failed(format!("http request failed: {}", e)),
        }
    }
}

/// Redis PING probe for cache dependencies.
pub struct RedisProbe {
    pool: Pool,
}

impl RedisProbe {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthProbe for RedisProbe {
    async fn probe(&self) -> ProbeOutcome {
        let started = Instant::now();
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => return ProbeOutcome::failed(format!("redis connect failed: {}", e)),
        };

        let ping: Result<String, redis::RedisError> =
            redis::cmd("PING").query_async(&mut conn).await;
        match ping {
            Ok(_) => ProbeOutcome {
                response_time_ms: Some(started.elapsed().as_millis() as u64),
                ..ProbeOutcome::healthy()
            },
            Err(e) => ProbeOutcome::failed(format!("redis ping failed: {}", e)),
        }
    }
}

/// Wraps an async closure as a probe. The main seam for in-process services
/// and for tests.
pub struct FnProbe {
    f: Box<dyn Fn() -> BoxFuture<'static, ProbeOutcome> + Send + Sync>,
}

impl FnProbe {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeOutcome> + Send + 'static,
    {
        Self {
            f: Box::new(move || Box::pin(f())),
        }
    }
}

#[async_trait]
impl HealthProbe for FnProbe {
    async fn probe(&self) -> ProbeOutcome {
        (self.f)().await
    }
}
