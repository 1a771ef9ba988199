use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::models::{
    Envelope, ErrorEnvelope, JobStatusData, MetricsData, ProbeResponse, SubmitData, SubmitRequest,
    TriggerAccepted, TriggerFailed, TriggerRejected,
};
use crate::auth::{TriggerAuth, TriggerVerdict};
use crate::generate::CarouselRequest;
use crate::jobs::{JobProcessor, JobStore, NewJob, StoreError};

pub mod models;

/// Header carrying the trigger secret.
pub const JOB_KEY_HEADER: &str = "x-job-key";
/// Header identifying the calling user on queue endpoints.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn JobStore>,
    pub processor: Arc<JobProcessor>,
    pub trigger: TriggerAuth,
    pub batch_size: i64,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Processing trigger (cron or manual)
        .route("/api/jobs/process", get(process_probe).post(process_trigger))
        // Queue: submit and inspect
        .route("/api/queue", post(submit_job))
        .route("/api/queue/status/:id", get(job_status))
        .route("/api/queue/metrics", get(queue_metrics))
        // Health
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Validation(String),
    NotFound,
    Forbidden,
    Internal(anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, envelope) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorEnvelope::new("UNAUTHORIZED", "caller identity required"),
            ),
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorEnvelope::new("VALIDATION", message),
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorEnvelope::new("NOT_FOUND", "job not found"),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                ErrorEnvelope::new("FORBIDDEN", "job belongs to another user"),
            ),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorEnvelope::new("INTERNAL", "internal error"),
                )
            }
        };
        (status, Json(envelope)).into_response()
    }
}

fn caller_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub async fn process_probe(State(state): State<ApiState>) -> Json<ProbeResponse> {
    Json(ProbeResponse {
        ok: true,
        info: "carousel job processor",
        env_ok: state.trigger.env_ok(),
    })
}

pub async fn process_trigger(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let presented = headers.get(JOB_KEY_HEADER).and_then(|v| v.to_str().ok());

    match state.trigger.check(presented) {
        TriggerVerdict::MissingEnv => reject_trigger("MISSING_ENV"),
        TriggerVerdict::BadHeader => reject_trigger("BAD_HEADER"),
        TriggerVerdict::Authorized => {
            match state.processor.process_batch(state.batch_size).await {
                Ok(summary) => (
                    StatusCode::OK,
                    Json(TriggerAccepted {
                        ok: true,
                        processed: summary.processed,
                    }),
                )
                    .into_response(),
                Err(e) => {
                    tracing::error!(error = %e, "batch processing failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(TriggerFailed {
                            ok: false,
                            error: "Processing failed",
                            message: e.to_string(),
                        }),
                    )
                        .into_response()
                }
            }
        }
    }
}

fn reject_trigger(reason: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(TriggerRejected {
            ok: false,
            error: "Unauthorized",
            reason,
        }),
    )
        .into_response()
}

pub async fn submit_job(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Envelope<SubmitData>>), ApiError> {
    let caller = caller_id(&headers).ok_or(ApiError::Unauthorized)?;

    if body.prompt.trim().is_empty() {
        return Err(ApiError::Validation("prompt is required".into()));
    }
    if let Some(n) = body.slide_count {
        if !(1..=CarouselRequest::MAX_SLIDE_COUNT).contains(&n) {
            return Err(ApiError::Validation(format!(
                "slideCount must be between 1 and {}",
                CarouselRequest::MAX_SLIDE_COUNT
            )));
        }
    }

    let request = CarouselRequest {
        prompt: body.prompt,
        slide_count: body.slide_count,
        tone: body.tone,
    };
    let payload = serde_json::to_value(&request).map_err(|e| ApiError::Internal(e.into()))?;

    let job = state.store.create(NewJob::new(caller, payload)).await?;
    tracing::info!(job_id = %job.id, user = %job.user_id, "job submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(Envelope::new(SubmitData {
            id: job.id,
            status: job.status,
        })),
    ))
}

/// Auth is checked before the id is parsed, so an anonymous caller with a
/// garbage id still sees 401 rather than 400.
pub async fn job_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Envelope<JobStatusData>>, ApiError> {
    let caller = caller_id(&headers).ok_or(ApiError::Unauthorized)?;

    let id = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::Validation("id must be a UUID".into()))?;

    let job = state.store.get(id).await?.ok_or(ApiError::NotFound)?;
    if job.user_id != caller {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(Envelope::new(JobStatusData::from(job))))
}

pub async fn queue_metrics(
    State(state): State<ApiState>,
) -> Result<Json<Envelope<MetricsData>>, ApiError> {
    let counts = state.store.counts().await?;
    Ok(Json(Envelope::new(MetricsData::from(counts))))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
