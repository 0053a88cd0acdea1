use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use relayq_core::{
    Coordinator, EnqueueRequest, Job, JobId, JobStatus, LeaseId, QueueError, QueueStat,
    SettleOutcome, Settlement,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{self, ApiAuth};
use crate::metrics;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
}

type ApiState = (AppState, ApiAuth);

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct CreatedResponse {
    #[schema(value_type = Uuid)]
    pub id: JobId,
    pub status: JobStatus,
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct LeaseRequest {
    #[serde(default)]
    pub queue: String,
    pub worker_id: String,
    #[serde(default)]
    pub max_jobs: i64,
    #[serde(default)]
    pub lease_ttl_seconds: i64,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct LeaseResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct AckRequest {
    pub worker_id: String,
    #[schema(value_type = Uuid)]
    pub lease_id: LeaseId,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct NackRequest {
    pub worker_id: String,
    #[schema(value_type = Uuid)]
    pub lease_id: LeaseId,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct QueuesResponse {
    pub queues: Vec<QueueStat>,
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams, utoipa::ToSchema)]
pub struct RecentQuery {
    /// Max number of jobs to return (1–1000, default 50).
    pub limit: Option<i64>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct RecentResponse {
    pub jobs: Vec<Job>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "relayq API",
        version = "0.1.0",
        description = "REST API for enqueueing jobs and leasing them to workers."
    ),
    paths(enqueue_job, get_job, lease_jobs, ack_job, nack_job, get_queues, get_recent),
    components(schemas(
        relayq_core::EnqueueRequest,
        relayq_core::Job,
        relayq_core::JobStatus,
        relayq_core::QueueStat,
        CreatedResponse,
        LeaseRequest,
        LeaseResponse,
        AckRequest,
        NackRequest,
        QueuesResponse,
        RecentQuery,
        RecentResponse
    ))
)]
struct ApiDoc;

async fn metrics_handler() -> ([(axum::http::header::HeaderName, &'static str); 1], String) {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics::gather(),
    )
}

pub fn build_app(state: AppState, api_auth: ApiAuth) -> Router {
    let unauthenticated = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler));

    let api_state: ApiState = (state, api_auth);
    let api = Router::new()
        .route("/v1/jobs", post(enqueue_job))
        .route("/v1/jobs/{id}", get(get_job))
        .route("/v1/lease", post(lease_jobs))
        .route("/v1/jobs/{id}/ack", post(ack_job))
        .route("/v1/jobs/{id}/nack", post(nack_job))
        .route("/v1/queues", get(get_queues))
        .route("/v1/recent", get(get_recent))
        .route_layer(middleware::from_fn_with_state(
            api_state.clone(),
            api_auth_middleware,
        ))
        .with_state(api_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(unauthenticated)
        .merge(api)
}

async fn api_auth_middleware(
    State((_state, auth)): State<ApiState>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, StatusCode> {
    if auth::check_api_auth(&auth, &req) {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Enqueue a new job.
#[utoipa::path(
    post,
    path = "/v1/jobs",
    request_body = EnqueueRequest,
    responses(
        (status = 201, description = "Job created", body = CreatedResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized (API_TOKEN required)"),
        (status = 503, description = "Storage unavailable")
    )
)]
async fn enqueue_job(
    State((state, _auth)): State<ApiState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let job = state.coordinator.enqueue(req).await.map_err(map_err)?;

    metrics::JOBS_ENQUEUED.inc();
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id: job.id,
            status: job.status,
            run_at: job.run_at,
        }),
    ))
}

/// Fetch a job by id.
#[utoipa::path(
    get,
    path = "/v1/jobs/{id}",
    params(("id" = uuid::Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job", body = Job),
        (status = 401, description = "Unauthorized (API_TOKEN required)"),
        (status = 404, description = "Job not found")
    )
)]
async fn get_job(
    State((state, _auth)): State<ApiState>,
    Path(id): Path<JobId>,
) -> Result<Json<Job>, (StatusCode, String)> {
    let job = state.coordinator.get(id).await.map_err(map_err)?;
    Ok(Json(job))
}

/// Lease up to `max_jobs` due jobs from a queue for a worker.
#[utoipa::path(
    post,
    path = "/v1/lease",
    request_body = LeaseRequest,
    responses(
        (status = 200, description = "Leased jobs (possibly empty)", body = LeaseResponse),
        (status = 401, description = "Unauthorized (API_TOKEN required)"),
        (status = 503, description = "Storage unavailable")
    )
)]
async fn lease_jobs(
    State((state, _auth)): State<ApiState>,
    Json(req): Json<LeaseRequest>,
) -> Result<Json<LeaseResponse>, (StatusCode, String)> {
    let lease_ttl = Duration::from_secs(req.lease_ttl_seconds.max(0) as u64);
    let jobs = state
        .coordinator
        .lease(&req.queue, &req.worker_id, req.max_jobs, lease_ttl)
        .await
        .map_err(map_err)?;

    metrics::JOBS_LEASED.inc_by(jobs.len() as u64);
    Ok(Json(LeaseResponse { jobs }))
}

/// Settle a leased job as succeeded.
#[utoipa::path(
    post,
    path = "/v1/jobs/{id}/ack",
    params(("id" = uuid::Uuid, Path, description = "Job ID")),
    request_body = AckRequest,
    responses(
        (status = 204, description = "Job settled"),
        (status = 401, description = "Unauthorized (API_TOKEN required)"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Lease does not match; discard the result"),
        (status = 503, description = "Storage unavailable")
    )
)]
async fn ack_job(
    State((state, _auth)): State<ApiState>,
    Path(id): Path<JobId>,
    Json(req): Json<AckRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    tracing::debug!(job_id = %id, worker_id = %req.worker_id, "ack received");
    state
        .coordinator
        .settle(id, req.lease_id, SettleOutcome::Success)
        .await
        .map_err(map_err)?;

    metrics::JOBS_SUCCEEDED.inc();
    Ok(StatusCode::NO_CONTENT)
}

/// Settle a leased job as failed (retry with backoff, or dead-letter).
#[utoipa::path(
    post,
    path = "/v1/jobs/{id}/nack",
    params(("id" = uuid::Uuid, Path, description = "Job ID")),
    request_body = NackRequest,
    responses(
        (status = 204, description = "Failure recorded"),
        (status = 401, description = "Unauthorized (API_TOKEN required)"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Lease does not match; discard the result"),
        (status = 503, description = "Storage unavailable")
    )
)]
async fn nack_job(
    State((state, _auth)): State<ApiState>,
    Path(id): Path<JobId>,
    Json(req): Json<NackRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    tracing::debug!(job_id = %id, worker_id = %req.worker_id, "nack received");
    let settlement = state
        .coordinator
        .settle(
            id,
            req.lease_id,
            SettleOutcome::Failure {
                error: req.error_message,
            },
        )
        .await
        .map_err(map_err)?;

    match settlement {
        Settlement::DeadLettered { .. } => metrics::JOBS_DEAD.inc(),
        _ => metrics::JOBS_RETRIED.inc(),
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Job counts grouped by queue and status.
#[utoipa::path(
    get,
    path = "/v1/queues",
    responses(
        (status = 200, description = "Queue statistics", body = QueuesResponse),
        (status = 401, description = "Unauthorized (API_TOKEN required)"),
        (status = 503, description = "Storage unavailable")
    )
)]
async fn get_queues(
    State((state, _auth)): State<ApiState>,
) -> Result<Json<QueuesResponse>, (StatusCode, String)> {
    let queues = state.coordinator.queue_stats().await.map_err(map_err)?;

    for stat in &queues {
        metrics::QUEUE_DEPTH
            .with_label_values(&[&stat.queue, &stat.status])
            .set(stat.count);
    }

    Ok(Json(QueuesResponse { queues }))
}

/// Most recently created jobs, newest first.
#[utoipa::path(
    get,
    path = "/v1/recent",
    params(RecentQuery),
    responses(
        (status = 200, description = "Recent jobs", body = RecentResponse),
        (status = 401, description = "Unauthorized (API_TOKEN required)"),
        (status = 503, description = "Storage unavailable")
    )
)]
async fn get_recent(
    State((state, _auth)): State<ApiState>,
    Query(q): Query<RecentQuery>,
) -> Result<Json<RecentResponse>, (StatusCode, String)> {
    let limit = q.limit.unwrap_or(50).clamp(1, 1000);
    let jobs = state.coordinator.recent(limit).await.map_err(map_err)?;
    Ok(Json(RecentResponse { jobs }))
}

fn map_err(e: QueueError) -> (StatusCode, String) {
    match e {
        QueueError::Invalid(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        QueueError::NotFound => (StatusCode::NOT_FOUND, e.to_string()),
        QueueError::InvalidLease => (StatusCode::CONFLICT, e.to_string()),
        QueueError::StorageUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}
