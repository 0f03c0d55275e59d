//! The `Transport` trait — the inter-process ready-queue hand-off from
//! engine to worker pool, plus the DLQ list and the active-policy cell.
//!
//! The wire contract is a named ordered list of UTF-8 job ids, a named
//! ordered list of DLQ JSON objects, and a single string key for the
//! active policy name — a shape chosen to sit comfortably on top of a
//! Redis list/string pair.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::CarouselResult;
use crate::job::DlqEntry;
use crate::policy::PolicyKind;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Appends a job id to the tail of the ready queue. Single-writer
    /// (the engine).
    async fn push_ready(&self, job_id: Uuid) -> CarouselResult<()>;

    /// Blocks up to `timeout` for a job id at the head of the ready
    /// queue, removing it. Returns `None` on timeout. Multi-reader (the
    /// worker pool); FIFO across readers.
    async fn pop_ready(&self, timeout: Duration) -> CarouselResult<Option<Uuid>>;

    /// Appends a dead-letter record. Multi-writer (any worker).
    async fn push_dlq(&self, entry: DlqEntry) -> CarouselResult<()>;

    /// Lists dead-letter records, newest-enqueued first, paginated.
    async fn list_dlq(&self, offset: u64, limit: u64) -> CarouselResult<(Vec<DlqEntry>, u64)>;

    /// Reads the currently active policy name. Single-reader (the
    /// engine); tolerant of staleness up to one tick.
    async fn get_active_policy(&self) -> CarouselResult<PolicyKind>;

    /// Sets the active policy name. Single-writer (the policy-switch
    /// interface).
    async fn set_active_policy(&self, policy: PolicyKind) -> CarouselResult<()>;

    /// Current length of the ready queue, for the scheduler-status and
    /// job-stats endpoints.
    async fn queue_depth(&self) -> CarouselResult<u64>;
}
