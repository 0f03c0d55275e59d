//! # Carousel API
//!
//! The thin request-response surface: submit/list/get/cancel a job,
//! read stats, switch the active policy, read scheduler status, list
//! the DLQ, and a health check. It is deliberately thin — every
//! operation is a direct call into the `JobStore`/`Transport` contracts
//! with no business logic of its own.

pub mod error;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use carousel_core::{
    CarouselResult, DlqEntry, Job, JobFilter, JobSpec, JobStatus, JobStore, Page, PolicyKind,
    Transport,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ApiError;

/// Everything a request handler needs, held behind `Arc` so cloning the
/// state for each request is cheap.
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub transport: Arc<dyn Transport>,
    pub known_job_types: Vec<String>,
    pub default_max_retries: u32,
    pub pool_size: usize,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/:id", get(get_job).delete(cancel_job))
        .route("/scheduler/policy", post(set_policy))
        .route("/scheduler/status", get(scheduler_status))
        .route("/dlq", get(list_dlq))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

#[derive(Deserialize)]
struct SubmitJobRequest {
    name: String,
    job_type: String,
    #[serde(default)]
    payload: serde_json::Value,
    priority: Option<u8>,
    estimated_duration: Option<f64>,
    max_retries: Option<u32>,
}

async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<Job>, ApiError> {
    let spec = JobSpec {
        name: req.name,
        job_type: req.job_type,
        payload: if req.payload.is_null() {
            serde_json::json!({})
        } else {
            req.payload
        },
        priority: req.priority,
        estimated_duration: req.estimated_duration,
        max_retries: Some(req.max_retries.unwrap_or(state.default_max_retries)),
    };

    let known: Vec<&str> = state.known_job_types.iter().map(String::as_str).collect();
    let resolved = spec.validate(&known)?;
    let job = state.store.create(resolved).await?;
    Ok(Json(job))
}

#[derive(Deserialize)]
struct ListJobsQuery {
    status: Option<String>,
    job_type: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Serialize)]
struct JobListResponse {
    items: Vec<Job>,
    total: u64,
    page: u32,
    page_size: u32,
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let status = q
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?;

    let filter = JobFilter {
        status,
        job_type: q.job_type,
    };
    let page = Page {
        page: q.page.unwrap_or(1),
        page_size: q.page_size.unwrap_or(50),
    };

    let result = state.store.list(filter, page).await?;
    Ok(Json(JobListResponse {
        items: result.items,
        total: result.total,
        page: result.page,
        page_size: result.page_size,
    }))
}

fn parse_status(s: &str) -> CarouselResult<JobStatus> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "scheduled" => Ok(JobStatus::Scheduled),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "retried" => Ok(JobStatus::Retried),
        other => Err(carousel_core::CarouselError::Validation(format!(
            "unknown status filter: {other}"
        ))),
    }
}

#[derive(Serialize)]
struct JobStatsResponse {
    counts_by_status: HashMap<String, u64>,
    dlq_size: u64,
    queue_depth: u64,
}

async fn job_stats(State(state): State<Arc<AppState>>) -> Result<Json<JobStatsResponse>, ApiError> {
    let counts = state.store.counts_by_status().await?;
    let (_, dlq_size) = state.transport.list_dlq(0, 0).await?;
    let queue_depth = state.transport.queue_depth().await?;

    Ok(Json(JobStatsResponse {
        counts_by_status: counts
            .into_iter()
            .map(|(status, n)| (status.to_string(), n))
            .collect(),
        dlq_size,
        queue_depth,
    }))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    let job = state.store.get(id).await?;
    Ok(Json(job))
}

#[derive(Serialize)]
struct CancelResponse {
    ok: bool,
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    state.store.delete(id).await?;
    Ok(Json(CancelResponse { ok: true }))
}

#[derive(Deserialize)]
struct SetPolicyRequest {
    policy: String,
}

#[derive(Serialize)]
struct SetPolicyResponse {
    policy: String,
    effective_at: DateTime<Utc>,
}

async fn set_policy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetPolicyRequest>,
) -> Result<Json<SetPolicyResponse>, ApiError> {
    let kind: PolicyKind = req
        .policy
        .parse()
        .map_err(|_| carousel_core::CarouselError::Validation(format!("unknown policy: {}", req.policy)))?;

    state.transport.set_active_policy(kind).await?;
    Ok(Json(SetPolicyResponse {
        policy: kind.to_string(),
        effective_at: Utc::now(),
    }))
}

#[derive(Serialize)]
struct SchedulerStatusResponse {
    policy: String,
    queue_depth: u64,
    pool_size: usize,
}

async fn scheduler_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SchedulerStatusResponse>, ApiError> {
    let policy = state.transport.get_active_policy().await?;
    let queue_depth = state.transport.queue_depth().await?;
    Ok(Json(SchedulerStatusResponse {
        policy: policy.to_string(),
        queue_depth,
        pool_size: state.pool_size,
    }))
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Serialize)]
struct DlqListResponse {
    items: Vec<DlqEntry>,
    total: u64,
}

async fn list_dlq(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PageQuery>,
) -> Result<Json<DlqListResponse>, ApiError> {
    let page = q.page.unwrap_or(1).max(1);
    let page_size = q.page_size.unwrap_or(50).clamp(1, carousel_core::MAX_PAGE_SIZE);
    let offset = u64::from(page - 1) * u64::from(page_size);

    let (items, total) = state.transport.list_dlq(offset, u64::from(page_size)).await?;
    Ok(Json(DlqListResponse { items, total }))
}

#[derive(Serialize)]
struct HealthResponse {
    store: &'static str,
    transport: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = if state
        .store
        .list(JobFilter::default(), Page { page: 1, page_size: 1 })
        .await
        .is_ok()
    {
        "ok"
    } else {
        "down"
    };
    let transport = if state.transport.queue_depth().await.is_ok() {
        "ok"
    } else {
        "down"
    };
    Json(HealthResponse { store, transport })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use carousel_testing::{InMemoryJobStore, InMemoryTransport};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState {
            store: Arc::new(InMemoryJobStore::new()),
            transport: Arc::new(InMemoryTransport::new()),
            known_job_types: vec!["sleep".to_string()],
            default_max_retries: 3,
            pool_size: 4,
        }
    }

    #[tokio::test]
    async fn submit_then_get_round_trips() {
        let app = build_router(test_state());

        let submit = Request::builder()
            .method("POST")
            .uri("/jobs")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"name": "a", "job_type": "sleep", "payload": {"duration_secs": 0}})
                    .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(submit).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn submit_with_unknown_job_type_is_bad_request() {
        let app = build_router(test_state());

        let submit = Request::builder()
            .method("POST")
            .uri("/jobs")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"name": "a", "job_type": "mystery"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(submit).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_missing_job_is_not_found() {
        let app = build_router(test_state());
        let req = Request::builder()
            .uri(format!("/jobs/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn set_policy_rejects_unknown_name() {
        let app = build_router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/scheduler/policy")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({"policy": "backfill"}).to_string()))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_ok_against_in_memory_fakes() {
        let app = build_router(test_state());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
