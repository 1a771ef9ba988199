use chrono::{DateTime, Utc};

use serde_json::Value;

use uuid::Uuid;

/// Default retry budget for newly submitted jobs. A job is retried while
/// `retry_count < max_retries`, so the default allows 4 attempts total.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub user_id: String,
    pub payload: Value,
    pub status: String,

    pub progress_percent: i32,
    pub progress_message: Option<String>,
    pub error_message: Option<String>,

    pub retry_count: i32,
    pub max_retries: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,

    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,

    pub result: Option<Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub payload: Value,
    pub max_retries: i32,
}

impl NewJob {
    pub fn new(user_id: impl Into<String>, payload: Value) -> Self {
        Self {
            user_id: user_id.into(),
            payload,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Snapshot for the queue metrics endpoint:
/// backlog depth, in-flight count, and terminal outcomes over the last 60s.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed_last_60s: i64,
    pub failed_last_60s: i64,
}
