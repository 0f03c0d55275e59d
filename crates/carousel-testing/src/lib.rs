//! In-memory `JobStore` and `Transport` fakes.
//!
//! A dependency every other crate's test suite reaches for instead of
//! standing up a real Postgres and Redis instance. `InMemoryJobStore`
//! uses a `DashMap` because concurrent worker tasks hit it from
//! multiple threads at once.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use carousel_core::{
    is_legal_transition, CarouselError, CarouselResult, DlqEntry, Job, JobFilter, JobStatus,
    JobStore, ListResult, Page, PolicyKind, ResolvedJobSpec, Transport, TransitionPatch,
};
use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// In-memory `JobStore`. Not durable — restarting the process loses all
/// state — which is exactly what makes it fast and deterministic for
/// tests.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job currently held, for assertions.
    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs.iter().map(|e| e.value().clone()).collect()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, spec: ResolvedJobSpec) -> CarouselResult<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            name: spec.name,
            job_type: spec.job_type,
            payload: spec.payload,
            priority: spec.priority,
            estimated_duration: spec.estimated_duration,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: spec.max_retries,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> CarouselResult<Job> {
        self.jobs
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(CarouselError::NotFound(id))
    }

    async fn list(&self, filter: JobFilter, page: Page) -> CarouselResult<ListResult<Job>> {
        let mut items: Vec<Job> = self
            .jobs
            .iter()
            .map(|e| e.value().clone())
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .filter(|j| {
                filter
                    .job_type
                    .as_deref()
                    .map_or(true, |t| j.job_type == t)
            })
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = items.len() as u64;
        let page = page.normalized();
        let start = page.offset().max(0) as usize;
        let end = (start + page.page_size as usize).min(items.len());
        let items = if start < items.len() {
            items[start..end].to_vec()
        } else {
            Vec::new()
        };

        Ok(ListResult {
            items,
            total,
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

        let mut entry = self.jobs.get_mut(&id).ok_or(CarouselError::NotFound(id))?;
        if entry.status != from {
            return Err(CarouselError::Conflict {
                id,
                expected: from.to_string(),
                actual: entry.status.to_string(),
            });
        }

        entry.status = to;
        entry.updated_at = Utc::now();
        if let Some(t) = patch.started_at {
            entry.started_at = Some(t);
        }
        if let Some(t) = patch.finished_at {
            entry.finished_at = Some(t);
        }
        if let Some(r) = patch.result {
            entry.result = Some(r);
        }
        if let Some(e) = patch.error {
            entry.error = Some(e);
        }
        if let Some(n) = patch.retry_count {
            entry.retry_count = n;
        }

        Ok(entry.clone())
    }

    async fn delete(&self, id: Uuid) -> CarouselResult<()> {
        let status = self
            .jobs
            .get(&id)
            .map(|e| e.status)
            .ok_or(CarouselError::NotFound(id))?;

        if !matches!(status, JobStatus::Pending | JobStatus::Scheduled) {
            return Err(CarouselError::Conflict {
                id,
                expected: "pending or scheduled".to_string(),
                actual: status.to_string(),
            });
        }

        self.jobs.remove(&id);
        Ok(())
    }

    async fn claim_pending(&self, limit: u32) -> CarouselResult<Vec<Job>> {
        let mut items: Vec<Job> = self
            .jobs
            .iter()
            .map(|e| e.value().clone())
            .filter(|j| j.status == JobStatus::Pending)
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn recover(&self) -> CarouselResult<u64> {
        let mut recovered = 0u64;
        for mut entry in self.jobs.iter_mut() {
            if matches!(entry.status, JobStatus::Running | JobStatus::Scheduled) {
                entry.status = JobStatus::Pending;
                entry.updated_at = Utc::now();
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn counts_by_status(&self) -> CarouselResult<Vec<(JobStatus, u64)>> {
        let mut counts: HashMap<JobStatus, u64> = HashMap::new();
        for entry in self.jobs.iter() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

/// In-memory `Transport`. A `Mutex<VecDeque<_>>` plus a `Notify` gives
/// `pop_ready` genuine blocking-with-timeout semantics instead of a poll
/// loop, matching the real Redis transport's `BLPOP` behavior closely
/// enough that tests exercise the same wait/wake pattern.
pub struct InMemoryTransport {
    ready: Mutex<VecDeque<Uuid>>,
    notify: Notify,
    dlq: Mutex<Vec<DlqEntry>>,
    policy: Mutex<PolicyKind>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dlq: Mutex::new(Vec::new()),
            policy: Mutex::new(PolicyKind::Fcfs),
        }
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn push_ready(&self, job_id: Uuid) -> CarouselResult<()> {
        self.ready.lock().await.push_back(job_id);
        self.notify.notify_one();
        Ok(())
    }

    async fn pop_ready(&self, timeout: Duration) -> CarouselResult<Option<Uuid>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(id) = self.ready.lock().await.pop_front() {
                return Ok(Some(id));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn push_dlq(&self, entry: DlqEntry) -> CarouselResult<()> {
        self.dlq.lock().await.push(entry);
        Ok(())
    }

    async fn list_dlq(&self, offset: u64, limit: u64) -> CarouselResult<(Vec<DlqEntry>, u64)> {
        let dlq = self.dlq.lock().await;
        let total = dlq.len() as u64;
        let items = dlq
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn get_active_policy(&self) -> CarouselResult<PolicyKind> {
        Ok(*self.policy.lock().await)
    }

    async fn set_active_policy(&self, policy: PolicyKind) -> CarouselResult<()> {
        *self.policy.lock().await = policy;
        Ok(())
    }

    async fn queue_depth(&self) -> CarouselResult<u64> {
        Ok(self.ready.lock().await.len() as u64)
    }
}

/// Builds a resolved spec with a randomized priority, for fixtures that
/// want to exercise policy ordering without hand-picking every value.
#[cfg(any(test, feature = "fixtures"))]
pub fn random_job_spec(job_type: &str) -> ResolvedJobSpec {
    use carousel_core::JobSpec;
    JobSpec {
        name: format!("{job_type}-{}", fastrand::u32(..)),
        job_type: job_type.to_string(),
        payload: serde_json::json!({}),
        priority: Some(fastrand::u8(carousel_core::MIN_PRIORITY..=carousel_core::MAX_PRIORITY)),
        estimated_duration: None,
        max_retries: None,
    }
    .validate(&[])
    .expect("randomized spec is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use carousel_core::JobSpec;

    fn spec(job_type: &str) -> ResolvedJobSpec {
        JobSpec {
            name: "test job".to_string(),
            job_type: job_type.to_string(),
            payload: serde_json::json!({}),
            priority: None,
            estimated_duration: None,
            max_retries: None,
        }
        .validate(&[])
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryJobStore::new();
        let job = store.create(spec("sleep")).await.unwrap();
        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn transition_enforces_cas() {
        let store = InMemoryJobStore::new();
        let job = store.create(spec("sleep")).await.unwrap();

        store
            .transition(
                job.id,
                JobStatus::Pending,
                JobStatus::Scheduled,
                TransitionPatch::new(),
            )
            .await
            .unwrap();

        let conflict = store
            .transition(
                job.id,
                JobStatus::Pending,
                JobStatus::Scheduled,
                TransitionPatch::new(),
            )
            .await;
        assert!(matches!(conflict, Err(CarouselError::Conflict { .. })));
    }

    #[tokio::test]
    async fn delete_only_allowed_before_running() {
        let store = InMemoryJobStore::new();
        let job = store.create(spec("sleep")).await.unwrap();
        store
            .transition(
                job.id,
                JobStatus::Pending,
                JobStatus::Scheduled,
                TransitionPatch::new(),
            )
            .await
            .unwrap();
        store
            .transition(
                job.id,
                JobStatus::Scheduled,
                JobStatus::Running,
                TransitionPatch::new().with_started_now(),
            )
            .await
            .unwrap();

        let result = store.delete(job.id).await;
        assert!(matches!(result, Err(CarouselError::Conflict { .. })));
    }

    #[tokio::test]
    async fn pop_ready_times_out_when_empty() {
        let transport = InMemoryTransport::new();
        let result = transport.pop_ready(Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn pop_ready_wakes_on_push() {
        let transport = std::sync::Arc::new(InMemoryTransport::new());
        let id = Uuid::new_v4();

        let reader = tokio::spawn({
            let transport = transport.clone();
            async move { transport.pop_ready(Duration::from_secs(2)).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        transport.push_ready(id).await.unwrap();

        let popped = reader.await.unwrap().unwrap();
        assert_eq!(popped, Some(id));
    }
}
