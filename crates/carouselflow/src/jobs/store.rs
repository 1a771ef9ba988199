use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::jobs::model::{Job, NewJob, QueueCounts};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence contract for the job queue.
///
/// The claimant-guarded mutations (`update_progress`, `mark_completed`,
/// `reschedule_for_retry`, `mark_failed`) return `false` instead of erroring
/// when the row is no longer in the expected state: a claim lost to the
/// staleness sweep must degrade into a skipped write, not a crashed batch.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in `pending` state and return the stored row.
    async fn create(&self, job: NewJob) -> Result<Job, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Atomically claim up to `limit` due pending jobs for `claimant`,
    /// oldest `created_at` first, moving them to `processing`.
    ///
    /// Two concurrent callers never receive the same job.
    async fn claim_batch(&self, claimant: &str, limit: i64) -> Result<Vec<Job>, StoreError>;

    /// Record progress for a claimed job. The stored percent never
    /// decreases; the message is latest-wins and `None` leaves it untouched.
    /// Refreshing `updated_at` here is what keeps a live claim out of the
    /// staleness sweep.
    async fn update_progress(
        &self,
        id: Uuid,
        claimant: &str,
        percent: i32,
        message: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Terminal success: progress forced to 100, result stored, claim
    /// released, any prior error cleared.
    async fn mark_completed(
        &self,
        id: Uuid,
        claimant: &str,
        result: Value,
    ) -> Result<bool, StoreError>;

    /// Put a failed job back in `pending` with `retry_count + 1`; it is not
    /// eligible for claiming again before `next_attempt_at`.
    async fn reschedule_for_retry(
        &self,
        id: Uuid,
        claimant: &str,
        next_attempt_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<bool, StoreError>;

    /// Terminal failure with `retry_count + 1` and the claim released.
    async fn mark_failed(
        &self,
        id: Uuid,
        claimant: &str,
        error_message: &str,
    ) -> Result<bool, StoreError>;

    /// Crash recovery: every `processing` job whose `updated_at` is older
    /// than `now - stale_after` goes back to `pending` with its claim
    /// cleared. Returns how many jobs were released. Does not touch
    /// `retry_count`; the sweep undoes a claim, it does not record an
    /// attempt.
    async fn release_stale(&self, stale_after: Duration) -> Result<u64, StoreError>;

    async fn counts(&self) -> Result<QueueCounts, StoreError>;
}
