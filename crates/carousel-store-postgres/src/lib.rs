//! PostgreSQL implementation of the Carousel job store.
//!
//! Provides `PgJobStore`, an implementation of `carousel_core::JobStore`
//! backed by a single `jobs` table. The CAS transition (§4.2) is a plain
//! `UPDATE ... WHERE status = $from RETURNING *`; no row lock is held
//! across the call, so concurrent workers racing the same id simply see
//! zero rows affected and map that to `Conflict`.
//!
//! # Database Schema
//!
//! See `migrations/0001_init.sql`. In short:
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id UUID PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     job_type TEXT NOT NULL,
//!     payload JSONB NOT NULL,
//!     priority SMALLINT NOT NULL DEFAULT 5,
//!     estimated_duration DOUBLE PRECISION NOT NULL DEFAULT 0,
//!     status TEXT NOT NULL DEFAULT 'pending',
//!     retry_count INTEGER NOT NULL DEFAULT 0,
//!     max_retries INTEGER NOT NULL DEFAULT 3,
//!     result JSONB,
//!     error TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     started_at TIMESTAMPTZ,
//!     finished_at TIMESTAMPTZ
//! );
//!
//! CREATE INDEX idx_jobs_status_created_at ON jobs (status, created_at);
//! CREATE INDEX idx_jobs_job_type ON jobs (job_type);
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use carousel_store_postgres::PgJobStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/carousel").await?;
//! let store = PgJobStore::new(pool);
//! ```

use anyhow::anyhow;
use async_trait::async_trait;
use carousel_core::{
    is_legal_transition, CarouselError, CarouselResult, Job, JobFilter, JobStatus, JobStore,
    ListResult, Page, ResolvedJobSpec, TransitionPatch,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Scheduled => "scheduled",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Retried => "retried",
    }
}

fn status_from_str(s: &str) -> CarouselResult<JobStatus> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "scheduled" => Ok(JobStatus::Scheduled),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "retried" => Ok(JobStatus::Retried),
        other => Err(CarouselError::Transient(anyhow!(
            "unrecognized status in store: {other}"
        ))),
    }
}

fn job_from_row(row: &PgRow) -> CarouselResult<Job> {
    let status: String = row.try_get("status").map_err(sqlx_err)?;
    Ok(Job {
        id: row.try_get("id").map_err(sqlx_err)?,
        name: row.try_get("name").map_err(sqlx_err)?,
        job_type: row.try_get("job_type").map_err(sqlx_err)?,
        payload: row.try_get("payload").map_err(sqlx_err)?,
        priority: row.try_get::<i16, _>("priority").map_err(sqlx_err)? as u8,
        estimated_duration: row.try_get("estimated_duration").map_err(sqlx_err)?,
        status: status_from_str(&status)?,
        retry_count: row.try_get::<i32, _>("retry_count").map_err(sqlx_err)? as u32,
        max_retries: row.try_get::<i32, _>("max_retries").map_err(sqlx_err)? as u32,
        result: row.try_get("result").map_err(sqlx_err)?,
        error: row.try_get("error").map_err(sqlx_err)?,
        created_at: row.try_get("created_at").map_err(sqlx_err)?,
        updated_at: row.try_get("updated_at").map_err(sqlx_err)?,
        started_at: row.try_get("started_at").map_err(sqlx_err)?,
        finished_at: row.try_get("finished_at").map_err(sqlx_err)?,
    })
}

fn sqlx_err(err: sqlx::Error) -> CarouselError {
    CarouselError::Transient(anyhow::Error::new(err))
}

/// PostgreSQL-backed `JobStore`.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the bundled migrations. Exposed for integration tests and
    /// small deployments; larger ones may prefer a dedicated migration
    /// step in their deploy pipeline.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, spec: ResolvedJobSpec) -> CarouselResult<Job> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO jobs (id, name, job_type, payload, priority, estimated_duration, max_retries)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&spec.name)
        .bind(&spec.job_type)
        .bind(&spec.payload)
        .bind(spec.priority as i16)
        .bind(spec.estimated_duration)
        .bind(spec.max_retries as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_err)?;

        job_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> CarouselResult<Job> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?
            .ok_or(CarouselError::NotFound(id))?;

        job_from_row(&row)
    }

    async fn list(&self, filter: JobFilter, page: Page) -> CarouselResult<ListResult<Job>> {
        let page = page.normalized();
        let status = filter.status.map(status_to_str);

        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR job_type = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(status)
        .bind(&filter.job_type)
        .bind(i64::from(page.page_size))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS total FROM jobs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR job_type = $2)
            "#,
        )
        .bind(status)
        .bind(&filter.job_type)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_err)?
        .try_get("total")
        .map_err(sqlx_err)?;

        let items = rows
            .iter()
            .map(job_from_row)
            .collect::<CarouselResult<Vec<_>>>()?;

        Ok(ListResult {
            items,
            total: total as u64,
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        patch: TransitionPatch,
    ) -> CarouselResult<Job> {
        if !is_legal_transition(from, to) {
            return Err(CarouselError::Validation(format!(
                "illegal transition {from} -> {to}"
            )));
        }

        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1,
                started_at = COALESCE($2, started_at),
                finished_at = COALESCE($3, finished_at),
                result = COALESCE($4, result),
                error = COALESCE($5, error),
                retry_count = COALESCE($6, retry_count),
                updated_at = NOW()
            WHERE id = $7 AND status = $8
            RETURNING *
            "#,
        )
        .bind(status_to_str(to))
        .bind(patch.started_at)
        .bind(patch.finished_at)
        .bind(&patch.result)
        .bind(&patch.error)
        .bind(patch.retry_count.map(|n| n as i32))
        .bind(id)
        .bind(status_to_str(from))
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?;

        match row {
            Some(row) => job_from_row(&row),
            None => {
                let current = self.get(id).await?;
                Err(CarouselError::Conflict {
                    id,
                    expected: status_to_str(from).to_string(),
                    actual: status_to_str(current.status).to_string(),
                })
            }
        }
    }

    async fn delete(&self, id: Uuid) -> CarouselResult<()> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE id = $1 AND status IN ('pending', 'scheduled')
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?;

        if deleted.is_some() {
            return Ok(());
        }

        let current = self.get(id).await?; // NotFound propagates as-is
        Err(CarouselError::Conflict {
            id,
            expected: "pending or scheduled".to_string(),
            actual: status_to_str(current.status).to_string(),
        })
    }

    async fn claim_pending(&self, limit: u32) -> CarouselResult<Vec<Job>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        rows.iter().map(job_from_row).collect()
    }

    async fn recover(&self) -> CarouselResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                updated_at = NOW()
            WHERE status IN ('running', 'scheduled')
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        let affected = result.rows_affected();
        tracing::info!(recovered = affected, "swept running/scheduled jobs back to pending");
        Ok(affected)
    }

    async fn counts_by_status(&self) -> CarouselResult<Vec<(JobStatus, u64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status").map_err(sqlx_err)?;
                let n: i64 = row.try_get("n").map_err(sqlx_err)?;
                Ok((status_from_str(&status)?, n as u64))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Scheduled,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Retried,
        ] {
            assert_eq!(status_from_str(status_to_str(status)).unwrap(), status);
        }
    }

    #[test]
    fn unrecognized_status_is_transient_not_a_panic() {
        assert!(matches!(
            status_from_str("quarantined"),
            Err(CarouselError::Transient(_))
        ));
    }
}
