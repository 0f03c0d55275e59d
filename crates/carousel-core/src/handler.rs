//! The handler registry contract: a process-wide mapping from `job_type`
//! string to the pure function that runs a job's payload.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CarouselResult;

/// A handler runs a job's payload and returns either a result map or a
/// `HandlerFailure`. Handlers are pure: no retry bookkeeping, no status
/// transitions — that is the worker pool's job.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn run(&self, payload: serde_json::Value) -> CarouselResult<serde_json::Value>;
}

/// Process-wide `job_type` → handler mapping. New handlers are added by
/// extending the registry; there is no dynamic plugin loading.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, job_type: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(job_type.into(), handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn known_job_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}
