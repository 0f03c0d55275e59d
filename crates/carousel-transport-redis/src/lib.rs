//! Redis implementation of the Carousel Ready Transport.
//!
//! The wire contract: the ready queue is a named Redis list (`RPUSH`
//! from the engine, `BLPOP` from workers), the DLQ is a second named
//! list of JSON blobs (`RPUSH`/`LRANGE`), and the active policy is a
//! single string key (`GET`/`SET`).
//!
//! # Usage
//!
//! ```rust,ignore
//! use carousel_transport_redis::RedisTransport;
//!
//! let cfg = deadpool_redis::Config::from_url("redis://localhost");
//! let pool = cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
//! let transport = RedisTransport::new(pool, "carousel");
//! ```

use async_trait::async_trait;
use carousel_core::{CarouselError, CarouselResult, DlqEntry, PolicyKind, Transport};
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

fn redis_err(err: impl std::fmt::Display) -> CarouselError {
    CarouselError::Transient(anyhow::anyhow!("{err}"))
}

/// Redis-backed `Transport`. All keys are namespaced under a single
/// prefix so multiple Carousel deployments can share a Redis instance.
#[derive(Clone)]
pub struct RedisTransport {
    pool: Pool,
    ready_key: String,
    dlq_key: String,
    policy_key: String,
}

impl RedisTransport {
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        let prefix = key_prefix.into();
        Self {
            pool,
            ready_key: format!("{prefix}:ready"),
            dlq_key: format!("{prefix}:dlq"),
            policy_key: format!("{prefix}:policy"),
        }
    }

    async fn conn(&self) -> CarouselResult<deadpool_redis::Connection> {
        self.pool.get().await.map_err(redis_err)
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn push_ready(&self, job_id: Uuid) -> CarouselResult<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .rpush(&self.ready_key, job_id.to_string())
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn pop_ready(&self, timeout: Duration) -> CarouselResult<Option<Uuid>> {
        let mut conn = self.conn().await?;
        let popped: Option<(String, String)> = conn
            .blpop(&self.ready_key, timeout.as_secs_f64())
            .await
            .map_err(redis_err)?;

        match popped {
            Some((_key, raw_id)) => {
                let id = Uuid::parse_str(&raw_id)
                    .map_err(|e| redis_err(format!("malformed job id on ready queue: {e}")))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn push_dlq(&self, entry: DlqEntry) -> CarouselResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&entry)
            .map_err(|e| redis_err(format!("failed to serialize DLQ entry: {e}")))?;
        let _: i64 = conn
            .rpush(&self.dlq_key, payload)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn list_dlq(&self, offset: u64, limit: u64) -> CarouselResult<(Vec<DlqEntry>, u64)> {
        let mut conn = self.conn().await?;
        let total: u64 = conn.llen(&self.dlq_key).await.map_err(redis_err)?;

        let start = offset as isize;
        let stop = (offset + limit).saturating_sub(1) as isize;
        let raw: Vec<String> = conn
            .lrange(&self.dlq_key, start, stop)
            .await
            .map_err(redis_err)?;

        let entries = raw
            .into_iter()
            .map(|s| {
                serde_json::from_str(&s)
                    .map_err(|e| redis_err(format!("corrupt DLQ entry: {e}")))
            })
            .collect::<CarouselResult<Vec<DlqEntry>>>()?;

        Ok((entries, total))
    }

    async fn get_active_policy(&self) -> CarouselResult<PolicyKind> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(&self.policy_key).await.map_err(redis_err)?;
        match raw {
            Some(s) => s.parse().map_err(|_| {
                redis_err(format!("unrecognized policy name in transport: {s}"))
            }),
            None => Ok(PolicyKind::Fcfs),
        }
    }

    async fn set_active_policy(&self, policy: PolicyKind) -> CarouselResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set(&self.policy_key, policy.as_str())
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn queue_depth(&self) -> CarouselResult<u64> {
        let mut conn = self.conn().await?;
        conn.llen(&self.ready_key).await.map_err(redis_err)
    }
}
