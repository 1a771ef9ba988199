use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::jobs::model::{Job, NewJob, QueueCounts};
use crate::jobs::store::{JobStore, StoreError};

/// Postgres-backed `JobStore`.
///
/// All queries go through the runtime query API so the crate builds without
/// a live database.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: NewJob) -> Result<Job, StoreError> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (user_id, payload, max_retries)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&job.user_id)
        .bind(&job.payload)
        .bind(job.max_retries)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    // Single-statement claim: the CTE locks up to `limit` due pending rows
    // with SKIP LOCKED, the outer UPDATE flips exactly those rows to
    // processing. Concurrent claimants skip each other's locked rows, so no
    // job is ever handed out twice.
    async fn claim_batch(&self, claimant: &str, limit: i64) -> Result<Vec<Job>, StoreError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let claimed = sqlx::query_as::<_, Job>(
            r#"
            WITH picked AS (
                SELECT id
                FROM jobs
                WHERE status = 'pending'
                  AND (next_attempt_at IS NULL OR next_attempt_at <= now())
                ORDER BY created_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            UPDATE jobs j
            SET status = 'processing',
                claimed_by = $2,
                claimed_at = now(),
                updated_at = now()
            FROM picked
            WHERE j.id = picked.id
            RETURNING j.*
            "#,
        )
        .bind(limit)
        .bind(claimant)
        .fetch_all(&self.pool)
        .await?;

        Ok(claimed)
    }

    async fn update_progress(
        &self,
        id: Uuid,
        claimant: &str,
        percent: i32,
        message: Option<&str>,
    ) -> Result<bool, StoreError> {
        // GREATEST keeps the stored percent monotone no matter what the
        // generator reports.
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET progress_percent = GREATEST(progress_percent, $3),
                progress_message = COALESCE($4, progress_message),
                updated_at = now()
            WHERE id = $1
              AND claimed_by = $2
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(claimant)
        .bind(percent.clamp(0, 100))
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        claimant: &str,
        result: Value,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                progress_percent = 100,
                error_message = NULL,
                result = $3,
                next_attempt_at = NULL,
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND claimed_by = $2
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(claimant)
        .bind(&result)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn reschedule_for_retry(
        &self,
        id: Uuid,
        claimant: &str,
        next_attempt_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                retry_count = retry_count + 1,
                next_attempt_at = $3,
                error_message = $4,
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND claimed_by = $2
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(claimant)
        .bind(next_attempt_at)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        claimant: &str,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                retry_count = retry_count + 1,
                next_attempt_at = NULL,
                error_message = $3,
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND claimed_by = $2
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(claimant)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn release_stale(&self, stale_after: Duration) -> Result<u64, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = now()
            WHERE status = 'processing'
              AND updated_at < now() - ($1::bigint * interval '1 second')
            "#,
        )
        .bind(stale_after.num_seconds())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }

    async fn counts(&self) -> Result<QueueCounts, StoreError> {
        let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;

        let processing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'processing'")
                .fetch_one(&self.pool)
                .await?;

        let completed_last_60s: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE status = 'completed'
              AND updated_at >= now() - interval '60 seconds'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let failed_last_60s: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE status = 'failed'
              AND updated_at >= now() - interval '60 seconds'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueCounts {
            pending,
            processing,
            completed_last_60s,
            failed_last_60s,
        })
    }
}
