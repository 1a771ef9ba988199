use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::{Job, QueueCounts};

/// Success envelope for the queue endpoints.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }
    }
}

/// GET probe for the processing trigger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    pub ok: bool,
    pub info: &'static str,
    pub env_ok: bool,
}

#[derive(Debug, Serialize)]
pub struct TriggerAccepted {
    pub ok: bool,
    pub processed: usize,
}

#[derive(Debug, Serialize)]
pub struct TriggerRejected {
    pub ok: bool,
    pub error: &'static str,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TriggerFailed {
    pub ok: bool,
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub prompt: String,
    pub slide_count: Option<u8>,
    pub tone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitData {
    pub id: Uuid,
    pub status: String,
}

/// Client-facing view of a job for the status endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusData {
    pub id: Uuid,
    pub status: String,
    pub progress: i32,
    pub message: Option<String>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusData {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress_percent,
            message: job.progress_message,
            error: job.error_message,
            retry_count: job.retry_count,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsData {
    pub pending: i64,
    pub processing: i64,
    pub completed_last_60s: i64,
    pub failed_last_60s: i64,
}

impl From<QueueCounts> for MetricsData {
    fn from(counts: QueueCounts) -> Self {
        Self {
            pending: counts.pending,
            processing: counts.processing,
            completed_last_60s: counts.completed_last_60s,
            failed_last_60s: counts.failed_last_60s,
        }
    }
}
