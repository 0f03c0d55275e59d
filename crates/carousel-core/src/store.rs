//! The `JobStore` trait — the durable mapping from job id to job record.
//!
//! Full CRUD plus a compare-and-set `transition` call, so every status
//! change is conditioned on the caller's expectation of the job's
//! current status rather than blindly overwriting it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CarouselResult;
use crate::job::{Job, JobFilter, JobStatus, ListResult, Page, ResolvedJobSpec};

/// A patch applied atomically alongside a CAS transition. Every field is
/// optional; `transition` only writes the ones that are `Some`.
#[derive(Debug, Clone, Default)]
pub struct TransitionPatch {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Absolute value to set, not a delta — callers read the current
    /// count and increment before building the patch.
    pub retry_count: Option<u32>,
}

impl TransitionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_started_now(mut self) -> Self {
        self.started_at = Some(Utc::now());
        self
    }

    pub fn with_finished_now(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }
}

/// Durable mapping from job id to job record.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists an already-validated `spec` as a new `Pending` job with
    /// `retry_count = 0` and returns the stored record. `spec` is a
    /// `ResolvedJobSpec`, produced by `JobSpec::validate`, so `create`
    /// itself performs no validation — it only assigns an id and writes.
    async fn create(&self, spec: ResolvedJobSpec) -> CarouselResult<Job>;

    /// Fetches a single job by id.
    async fn get(&self, id: Uuid) -> CarouselResult<Job>;

    /// Lists jobs matching `filter`, newest-created first, paginated and
    /// capped at `MAX_PAGE_SIZE`.
    async fn list(&self, filter: JobFilter, page: Page) -> CarouselResult<ListResult<Job>>;

    /// Atomic compare-and-set: succeeds only if the job's current status
    /// is exactly `from`. Applies `patch` in the same commit.
    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        patch: TransitionPatch,
    ) -> CarouselResult<Job>;

    /// Deletes a job, but only if its status is `Pending` or `Scheduled`.
    async fn delete(&self, id: Uuid) -> CarouselResult<()>;

    /// Returns up to `limit` `Pending` jobs, oldest-created first, without
    /// transitioning them. Read-only; feeds the engine's in-memory policy.
    async fn claim_pending(&self, limit: u32) -> CarouselResult<Vec<Job>>;

    /// Crash recovery sweep: every `Running` job with no live worker claim
    /// and every `Scheduled` job is flipped back to `Pending`.
    /// `retry_count` is left untouched — a dispatch that never returned a
    /// handler verdict is not a failure for retry accounting.
    async fn recover(&self) -> CarouselResult<u64>;

    /// Counts of jobs per status, for the stats/scheduler-status endpoints.
    async fn counts_by_status(&self) -> CarouselResult<Vec<(JobStatus, u64)>>;
}
