//! The `Job` entity and the requests/views built around it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CarouselError, CarouselResult};

/// Highest priority a job may request. Lower numbers run first.
pub const MIN_PRIORITY: u8 = 1;
/// Lowest priority a job may request.
pub const MAX_PRIORITY: u8 = 10;
/// Priority assigned when a submission omits one.
pub const DEFAULT_PRIORITY: u8 = 5;
/// `max_retries` assigned when a submission omits one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The lifecycle states a job passes through. See the state machine in
/// the top-level design doc for the legal transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Retried,
}

impl JobStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retried => "retried",
        };
        f.write_str(s)
    }
}

/// The durable record for a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: u8,
    pub estimated_duration: f64,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Inbound submission. Validated by [`JobSpec::validate`] before a store
/// ever sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub job_type: String,
    #[serde(default = "default_payload")]
    pub payload: serde_json::Value,
    pub priority: Option<u8>,
    pub estimated_duration: Option<f64>,
    pub max_retries: Option<u32>,
}

fn default_payload() -> serde_json::Value {
    serde_json::json!({})
}

impl JobSpec {
    /// Validates and resolves defaults, producing the values
    /// `JobStore::create` should persist. `known_job_types` lets callers
    /// reject unregistered handler tags at submission time per the
    /// "unknown handler invariant" in the design notes.
    pub fn validate(&self, known_job_types: &[&str]) -> CarouselResult<ResolvedJobSpec> {
        if self.name.trim().is_empty() {
            return Err(CarouselError::Validation("name must not be empty".into()));
        }
        if !known_job_types.is_empty() && !known_job_types.contains(&self.job_type.as_str()) {
            return Err(CarouselError::Validation(format!(
                "unknown job_type: {}",
                self.job_type
            )));
        }
        let priority = self.priority.unwrap_or(DEFAULT_PRIORITY);
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(CarouselError::Validation(format!(
                "priority must be in [{MIN_PRIORITY}, {MAX_PRIORITY}], got {priority}"
            )));
        }
        let estimated_duration = self.estimated_duration.unwrap_or(0.0);
        if estimated_duration < 0.0 {
            return Err(CarouselError::Validation(
                "estimated_duration must be non-negative".into(),
            ));
        }
        let max_retries = self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if !self.payload.is_object() {
            return Err(CarouselError::Validation(
                "payload must be a JSON object".into(),
            ));
        }

        Ok(ResolvedJobSpec {
            name: self.name.clone(),
            job_type: self.job_type.clone(),
            payload: self.payload.clone(),
            priority,
            estimated_duration,
            max_retries,
        })
    }
}

/// A `JobSpec` after defaulting and validation. This is what
/// `JobStore::create` actually persists.
#[derive(Debug, Clone)]
pub struct ResolvedJobSpec {
    pub name: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: u8,
    pub estimated_duration: f64,
    pub max_retries: u32,
}

/// A lightweight view of a job used by the in-memory [`crate::policy::Policy`]
/// implementations. Carrying only the ordering-relevant fields keeps
/// policies decoupled from the full `Job` record and from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub estimated_duration_millis: u64,
}

impl JobSummary {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id,
            priority: job.priority,
            created_at: job.created_at,
            estimated_duration_millis: (job.estimated_duration * 1000.0).round() as u64,
        }
    }
}

/// Filter applied by `JobStore::list`.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
}

/// Pagination request/response envelope, shared by `list` and `list_dlq`.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

/// Largest `page_size` the store will honor regardless of what is asked
/// for.
pub const MAX_PAGE_SIZE: u32 = 200;

impl Page {
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(self) -> i64 {
        let n = self.normalized();
        i64::from(n.page.saturating_sub(1)) * i64::from(n.page_size)
    }
}

/// A page of results plus the total row count matching the filter.
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// An append-only dead-letter record: a job that exhausted its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub job_id: Uuid,
    pub final_error: String,
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Builds a `DlqEntry` stamped with the current time.
pub fn dlq_entry(job_id: Uuid, final_error: String, retry_count: u32) -> DlqEntry {
    DlqEntry {
        job_id,
        final_error,
        retry_count,
        enqueued_at: Utc::now(),
    }
}
