use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatus, NewJob, QueueCounts};
use crate::jobs::store::{JobStore, StoreError};

/// In-process `JobStore` over a mutex-guarded map.
///
/// Backs the integration tests, the `cflowctl demo` subcommand, and local
/// runs without Postgres. Claim exclusivity holds because the whole claim is
/// one critical section.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    // created_at is the claim-order key; keep it strictly increasing even
    // when the clock ties across rapid inserts.
    last_created_at: Option<DateTime<Utc>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: age a job's `updated_at` so the staleness sweep sees it.
    pub async fn backdate_updated_at(&self, id: Uuid, by: Duration) {
        let mut inner = self.inner.lock().await;
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.updated_at = job.updated_at - by;
        }
    }

    /// Test hook: make a rescheduled job due immediately.
    pub async fn make_due_now(&self, id: Uuid) {
        let mut inner = self.inner.lock().await;
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.next_attempt_at = Some(Utc::now() - Duration::seconds(1));
        }
    }
}

impl Inner {
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_created_at {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_created_at = Some(now);
        now
    }
}

fn is_due(job: &Job, now: DateTime<Utc>) -> bool {
    job.next_attempt_at.map(|at| at <= now).unwrap_or(true)
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: NewJob) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = inner.next_created_at();
        let row = Job {
            id: Uuid::new_v4(),
            user_id: job.user_id,
            payload: job.payload,
            status: JobStatus::Pending.as_str().to_string(),
            progress_percent: 0,
            progress_message: None,
            error_message: None,
            retry_count: 0,
            max_retries: job.max_retries,
            next_attempt_at: None,
            claimed_by: None,
            claimed_at: None,
            result: None,
            created_at: now,
            updated_at: now,
        };
        inner.jobs.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(&id).cloned())
    }

    async fn claim_batch(&self, claimant: &str, limit: i64) -> Result<Vec<Job>, StoreError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let mut due: Vec<(DateTime<Utc>, Uuid)> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending.as_str() && is_due(j, now))
            .map(|j| (j.created_at, j.id))
            .collect();
        due.sort();
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.status = JobStatus::Processing.as_str().to_string();
                job.claimed_by = Some(claimant.to_string());
                job.claimed_at = Some(now);
                job.updated_at = now;
                claimed.push(job.clone());
            }
        }

        Ok(claimed)
    }

    async fn update_progress(
        &self,
        id: Uuid,
        claimant: &str,
        percent: i32,
        message: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.claimed_by.as_deref() != Some(claimant)
            || job.status != JobStatus::Processing.as_str()
        {
            return Ok(false);
        }

        job.progress_percent = job.progress_percent.max(percent.clamp(0, 100));
        if let Some(message) = message {
            job.progress_message = Some(message.to_string());
        }
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        claimant: &str,
        result: Value,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.claimed_by.as_deref() != Some(claimant)
            || job.status != JobStatus::Processing.as_str()
        {
            return Ok(false);
        }

        job.status = JobStatus::Completed.as_str().to_string();
        job.progress_percent = 100;
        job.error_message = None;
        job.result = Some(result);
        job.next_attempt_at = None;
        job.claimed_by = None;
        job.claimed_at = None;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn reschedule_for_retry(
        &self,
        id: Uuid,
        claimant: &str,
        next_attempt_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.claimed_by.as_deref() != Some(claimant)
            || job.status != JobStatus::Processing.as_str()
        {
            return Ok(false);
        }

        job.status = JobStatus::Pending.as_str().to_string();
        job.retry_count += 1;
        job.next_attempt_at = Some(next_attempt_at);
        job.error_message = Some(error_message.to_string());
        job.claimed_by = None;
        job.claimed_at = None;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        claimant: &str,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.claimed_by.as_deref() != Some(claimant)
            || job.status != JobStatus::Processing.as_str()
        {
            return Ok(false);
        }

        job.status = JobStatus::Failed.as_str().to_string();
        job.retry_count += 1;
        job.next_attempt_at = None;
        job.error_message = Some(error_message.to_string());
        job.claimed_by = None;
        job.claimed_at = None;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn release_stale(&self, stale_after: Duration) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let cutoff = Utc::now() - stale_after;

        let mut released = 0u64;
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Processing.as_str() && job.updated_at < cutoff {
                job.status = JobStatus::Pending.as_str().to_string();
                job.claimed_by = None;
                job.claimed_at = None;
                job.updated_at = Utc::now();
                released += 1;
            }
        }
        Ok(released)
    }

    async fn counts(&self) -> Result<QueueCounts, StoreError> {
        let inner = self.inner.lock().await;
        let minute_ago = Utc::now() - Duration::seconds(60);

        let mut counts = QueueCounts::default();
        for job in inner.jobs.values() {
            match job.status.as_str() {
                "pending" => counts.pending += 1,
                "processing" => counts.processing += 1,
                "completed" if job.updated_at >= minute_ago => counts.completed_last_60s += 1,
                "failed" if job.updated_at >= minute_ago => counts.failed_last_60s += 1,
                _ => {}
            }
        }
        Ok(counts)
    }
}
