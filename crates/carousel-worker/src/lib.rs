//! # Carousel Worker
//!
//! The worker pool: a fixed pool of K executor tasks, each independently
//! block-popping a job id from the ready transport, running it through
//! the handler registry, and driving the retry/DLQ state machine on the
//! result.
//!
//! Executors share only the `JobStore` and `Transport` handles — both
//! are `Send + Sync` trait objects — and are otherwise fully isolated,
//! so one slow handler cannot stall another.

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use carousel_core::{
    CarouselError, CarouselResult, HandlerRegistry, JobStatus, JobStore, Transport,
    TransitionPatch,
};
use uuid::Uuid;

/// Worker pool tuning knobs, fed by environment variables in the
/// `carousel-worker` binary.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub pool_size: usize,
    pub pop_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            pop_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the shared handles every executor task borrows. `run` spawns
/// `pool_size` executor loops and waits for all of them to exit.
pub struct WorkerPool<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
}

impl<S, T> WorkerPool<S, T>
where
    S: JobStore + 'static,
    T: Transport + 'static,
{
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        registry: HandlerRegistry,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            transport,
            registry: Arc::new(registry),
            config,
        }
    }

    /// Runs the pool until `shutdown` signals true. Each executor checks
    /// the signal between pop attempts, so shutdown is observed within
    /// one `pop_timeout` in the worst case.
    pub async fn run(self, shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut tasks = Vec::with_capacity(self.config.pool_size);
        for executor_id in 0..self.config.pool_size {
            let store = self.store.clone();
            let transport = self.transport.clone();
            let registry = self.registry.clone();
            let pop_timeout = self.config.pop_timeout;
            let mut shutdown = shutdown.clone();

            tasks.push(tokio::spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }

                    tokio::select! {
                        popped = transport.pop_ready(pop_timeout) => {
                            match popped {
                                Ok(Some(id)) => {
                                    execute_one(
                                        executor_id,
                                        store.as_ref(),
                                        transport.as_ref(),
                                        registry.as_ref(),
                                        id,
                                    )
                                    .await;
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    tracing::warn!(executor_id, error = %e, "pop_ready failed; backing off");
                                    tokio::time::sleep(Duration::from_millis(250)).await;
                                }
                            }
                        }
                        res = shutdown.changed() => {
                            if res.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                tracing::info!(executor_id, "executor stopped");
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
    }
}

/// Claims a popped job id into `Running`, dispatches it to its handler,
/// and drives the completion/retry/DLQ outcome.
async fn execute_one<S, T>(
    executor_id: usize,
    store: &S,
    transport: &T,
    registry: &HandlerRegistry,
    id: Uuid,
) where
    S: JobStore,
    T: Transport,
{
    let running = match store
        .transition(
            id,
            JobStatus::Scheduled,
            JobStatus::Running,
            TransitionPatch::new().with_started_now(),
        )
        .await
    {
        Ok(job) => job,
        Err(CarouselError::Conflict { .. }) | Err(CarouselError::NotFound(_)) => {
            tracing::debug!(executor_id, job = %id, "job canceled or already claimed; discarding");
            return;
        }
        Err(e) => {
            tracing::warn!(executor_id, job = %id, error = %e, "failed to claim job for execution");
            return;
        }
    };

    let outcome = match registry.get(&running.job_type) {
        Some(handler) => handler.run(running.payload.clone()).await,
        None => Err(CarouselError::UnknownJobType(running.job_type.clone())),
    };

    match outcome {
        Ok(result) => {
            if let Err(e) = store
                .transition(
                    id,
                    JobStatus::Running,
                    JobStatus::Completed,
                    TransitionPatch::new().with_finished_now().with_result(result),
                )
                .await
            {
                tracing::warn!(executor_id, job = %id, error = %e, "failed to record completion");
            } else {
                tracing::info!(executor_id, job = %id, "job completed");
            }
        }
        Err(err) => {
            handle_failure(executor_id, store, transport, &running, id, err).await;
        }
    }
}

async fn handle_failure<S, T>(
    executor_id: usize,
    store: &S,
    transport: &T,
    running: &carousel_core::Job,
    id: Uuid,
    err: CarouselError,
) where
    S: JobStore,
    T: Transport,
{
    let message = err.to_string();
    let max_retries = running.max_retries;
    let next_retry_count = running.retry_count + 1;

    let retryable = matches!(
        carousel_core::Categorizable::failure_kind(&err),
        carousel_core::FailureKind::Retryable
    );

    if retryable && next_retry_count <= max_retries {
        let retried = store
            .transition(
                id,
                JobStatus::Running,
                JobStatus::Retried,
                TransitionPatch::new()
                    .with_retry_count(next_retry_count)
                    .with_error(message.clone()),
            )
            .await;

        match retried {
            Ok(_) => {
                if let Err(e) = store
                    .transition(id, JobStatus::Retried, JobStatus::Pending, TransitionPatch::new())
                    .await
                {
                    tracing::warn!(executor_id, job = %id, error = %e, "failed to requeue retried job");
                }
                tracing::info!(executor_id, job = %id, retry_count = next_retry_count, "job retried");
            }
            Err(e) => {
                tracing::warn!(executor_id, job = %id, error = %e, "failed to record retry");
            }
        }
        return;
    }

    match store
        .transition(
            id,
            JobStatus::Running,
            JobStatus::Failed,
            TransitionPatch::new().with_finished_now().with_error(message.clone()),
        )
        .await
    {
        Ok(_) => {
            let entry = carousel_core::dlq_entry(id, message, running.retry_count);
            if let Err(e) = transport.push_dlq(entry).await {
                tracing::error!(executor_id, job = %id, error = %e, "failed to append DLQ entry after marking job FAILED");
            } else {
                tracing::warn!(executor_id, job = %id, "job failed permanently; sent to DLQ");
            }
        }
        Err(e) => {
            tracing::warn!(executor_id, job = %id, error = %e, "failed to record terminal failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carousel_core::{Handler, JobSpec};
    use carousel_testing::{InMemoryJobStore, InMemoryTransport};
    use std::sync::Arc;

    struct AlwaysFails;

    #[async_trait::async_trait]
    impl Handler for AlwaysFails {
        async fn run(&self, _payload: serde_json::Value) -> CarouselResult<serde_json::Value> {
            Err(CarouselError::HandlerFailure("boom".to_string()))
        }
    }

    struct AlwaysSucceeds;

    #[async_trait::async_trait]
    impl Handler for AlwaysSucceeds {
        async fn run(&self, _payload: serde_json::Value) -> CarouselResult<serde_json::Value> {
            Ok(serde_json::json!({ "ok": true }))
        }
    }

    async fn scheduled_job(store: &InMemoryJobStore, job_type: &str, max_retries: u32) -> Uuid {
        let spec = JobSpec {
            name: "test".to_string(),
            job_type: job_type.to_string(),
            payload: serde_json::json!({}),
            priority: None,
            estimated_duration: None,
            max_retries: Some(max_retries),
        }
        .validate(&[])
        .unwrap();
        let job = store.create(spec).await.unwrap();
        store
            .transition(job.id, JobStatus::Pending, JobStatus::Scheduled, TransitionPatch::new())
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn exhausted_retries_lands_job_in_dlq() {
        let store = InMemoryJobStore::new();
        let transport = InMemoryTransport::new();
        let registry = HandlerRegistry::new().register("fail", Arc::new(AlwaysFails));

        let id = scheduled_job(&store, "fail", 0).await;
        execute_one(0, &store, &transport, &registry, id).await;

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let (entries, total) = transport.list_dlq(0, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(entries[0].job_id, id);
    }

    #[tokio::test]
    async fn failure_under_retry_budget_requeues_to_pending() {
        let store = InMemoryJobStore::new();
        let transport = InMemoryTransport::new();
        let registry = HandlerRegistry::new().register("fail", Arc::new(AlwaysFails));

        let id = scheduled_job(&store, "fail", 3).await;
        execute_one(0, &store, &transport, &registry, id).await;

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        let (_, total) = transport.list_dlq(0, 10).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn successful_handler_completes_the_job() {
        let store = InMemoryJobStore::new();
        let transport = InMemoryTransport::new();
        let registry = HandlerRegistry::new().register("ok", Arc::new(AlwaysSucceeds));

        let id = scheduled_job(&store, "ok", 3).await;
        execute_one(0, &store, &transport, &registry, id).await;

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(serde_json::json!({ "ok": true })));
    }

    #[tokio::test]
    async fn canceled_job_is_discarded_without_panicking() {
        let store = InMemoryJobStore::new();
        let transport = InMemoryTransport::new();
        let registry = HandlerRegistry::new().register("ok", Arc::new(AlwaysSucceeds));

        let id = scheduled_job(&store, "ok", 3).await;
        store.delete(id).await.unwrap(); // cancel while SCHEDULED

        // The job no longer exists; claiming it for RUNNING must discard,
        // not panic.
        execute_one(0, &store, &transport, &registry, id).await;
        assert!(matches!(store.get(id).await, Err(CarouselError::NotFound(_))));
    }

    #[tokio::test]
    async fn unknown_job_type_is_non_retryable() {
        let store = InMemoryJobStore::new();
        let transport = InMemoryTransport::new();
        let registry = HandlerRegistry::new(); // nothing registered

        let id = scheduled_job(&store, "mystery", 5).await;
        execute_one(0, &store, &transport, &registry, id).await;

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed, "unknown job_type must not consume a retry");
        let (_, total) = transport.list_dlq(0, 10).await.unwrap();
        assert_eq!(total, 1);
    }
}
