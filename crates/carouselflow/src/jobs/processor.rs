use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::generate::{CarouselGenerator, CarouselRequest, GenerateError};
use crate::jobs::model::Job;
use crate::jobs::retry::{classify, next_delay_seconds, FailureClass, RetryPolicy};
use crate::jobs::store::{JobStore, StoreError};

/// Hard ceiling on how many jobs a single invocation may claim.
pub const MAX_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub instance_id: String,
    pub job_timeout: Duration,
    pub stale_after: chrono::Duration,
    pub retry: RetryPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            instance_id: "cflow-1".to_string(),
            job_timeout: Duration::from_secs(60),
            stale_after: chrono::Duration::seconds(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome tally for one `process_batch` invocation.
///
/// `processed` counts every claimed job regardless of how it ended;
/// `reclaimed` counts stale claims released by the sweep at the start.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    pub reclaimed: u64,
    pub processed: usize,
    pub completed: usize,
    pub requeued: usize,
    pub failed: usize,
}

/// Reports generator progress back to the store for one claimed job.
///
/// Failed writes are logged and swallowed: progress is advisory, and a claim
/// lost mid-flight must not abort generation (the final transition will miss
/// its guard and be logged instead).
#[derive(Clone)]
pub struct ProgressHandle {
    store: Arc<dyn JobStore>,
    job_id: Uuid,
    claimant: String,
}

impl ProgressHandle {
    pub fn new(store: Arc<dyn JobStore>, job_id: Uuid, claimant: impl Into<String>) -> Self {
        Self {
            store,
            job_id,
            claimant: claimant.into(),
        }
    }

    pub async fn report(&self, percent: i32, message: &str) {
        match self
            .store
            .update_progress(self.job_id, &self.claimant, percent, Some(message))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = %self.job_id, "progress update skipped, claim no longer held")
            }
            Err(e) => tracing::warn!(job_id = %self.job_id, error = %e, "progress update failed"),
        }
    }
}

struct ExecutionResult {
    result: Result<Value, GenerateError>,
    latency_ms: i64,
}

/// Drives one batch through sweep, claim, concurrent execution and outcome
/// routing. Stateless across invocations; overlapping callers coordinate
/// solely through the store's atomic claim.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    generator: Arc<dyn CarouselGenerator>,
    cfg: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        generator: Arc<dyn CarouselGenerator>,
        cfg: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            generator,
            cfg,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.cfg.instance_id
    }

    pub async fn process_batch(&self, limit: i64) -> Result<BatchSummary, StoreError> {
        let limit = limit.clamp(0, MAX_BATCH_SIZE);

        // Recovery piggybacks on every invocation: jobs stranded by a dead
        // claimant become claimable again before this batch is picked.
        let reclaimed = self.store.release_stale(self.cfg.stale_after).await?;
        if reclaimed > 0 {
            tracing::info!(reclaimed, "released stale processing claims");
        }

        let mut summary = BatchSummary {
            reclaimed,
            ..Default::default()
        };
        if limit == 0 {
            return Ok(summary);
        }

        let batch = self.store.claim_batch(&self.cfg.instance_id, limit).await?;
        summary.processed = batch.len();
        if batch.is_empty() {
            return Ok(summary);
        }
        tracing::info!(
            claimed = batch.len(),
            instance = %self.cfg.instance_id,
            "claimed batch"
        );

        let mut join_set = JoinSet::new();
        let mut claimed: HashMap<tokio::task::Id, Job> = HashMap::new();
        for job in batch {
            let snapshot = job.clone();
            let handle = join_set.spawn(run_job(
                Arc::clone(&self.store),
                Arc::clone(&self.generator),
                self.cfg.instance_id.clone(),
                self.cfg.job_timeout,
                job,
            ));
            claimed.insert(handle.id(), snapshot);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((task_id, exec)) => {
                    let Some(job) = claimed.remove(&task_id) else {
                        continue;
                    };
                    match exec.result {
                        Ok(deck) => {
                            self.on_success(&job, deck, exec.latency_ms, &mut summary)
                                .await?
                        }
                        Err(err) => self.on_failure(&job, &err, &mut summary).await?,
                    }
                }
                Err(join_err) => {
                    // A panicking generator task must not strand its job in
                    // processing.
                    let Some(job) = claimed.remove(&join_err.id()) else {
                        continue;
                    };
                    let err =
                        GenerateError::new("PANIC", format!("job task panicked: {join_err}"));
                    self.on_failure(&job, &err, &mut summary).await?;
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            completed = summary.completed,
            requeued = summary.requeued,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }

    async fn on_success(
        &self,
        job: &Job,
        deck: Value,
        latency_ms: i64,
        summary: &mut BatchSummary,
    ) -> Result<(), StoreError> {
        if self
            .store
            .mark_completed(job.id, &self.cfg.instance_id, deck)
            .await?
        {
            summary.completed += 1;
            tracing::info!(job_id = %job.id, latency_ms, "job completed");
        } else {
            tracing::warn!(job_id = %job.id, "completion skipped, claim no longer held");
        }
        Ok(())
    }

    async fn on_failure(
        &self,
        job: &Job,
        err: &GenerateError,
        summary: &mut BatchSummary,
    ) -> Result<(), StoreError> {
        let error_message = format!("{}: {}", err.code, err.message);
        let can_retry =
            classify(err.code) == FailureClass::Retryable && job.retry_count < job.max_retries;

        if can_retry {
            // the attempt that just failed, counting from 1
            let attempt_no = job.retry_count + 1;
            let mut rng = StdRng::from_entropy();
            let delay = next_delay_seconds(attempt_no, &self.cfg.retry, &mut rng);
            let next_attempt_at = Utc::now() + chrono::Duration::seconds(delay);

            if self
                .store
                .reschedule_for_retry(
                    job.id,
                    &self.cfg.instance_id,
                    next_attempt_at,
                    &error_message,
                )
                .await?
            {
                summary.requeued += 1;
                tracing::info!(
                    job_id = %job.id,
                    code = err.code,
                    delay_seconds = delay,
                    "job requeued for retry"
                );
            } else {
                tracing::warn!(job_id = %job.id, "requeue skipped, claim no longer held");
            }
            return Ok(());
        }

        if self
            .store
            .mark_failed(job.id, &self.cfg.instance_id, &error_message)
            .await?
        {
            summary.failed += 1;
            tracing::warn!(
                job_id = %job.id,
                code = err.code,
                retry_count = job.retry_count,
                "job failed terminally"
            );
        } else {
            tracing::warn!(job_id = %job.id, "failure mark skipped, claim no longer held");
        }
        Ok(())
    }
}

async fn run_job(
    store: Arc<dyn JobStore>,
    generator: Arc<dyn CarouselGenerator>,
    claimant: String,
    job_timeout: Duration,
    job: Job,
) -> ExecutionResult {
    let start = Instant::now();
    let result = execute(store, generator, claimant, job_timeout, &job).await;
    ExecutionResult {
        result,
        latency_ms: start.elapsed().as_millis() as i64,
    }
}

async fn execute(
    store: Arc<dyn JobStore>,
    generator: Arc<dyn CarouselGenerator>,
    claimant: String,
    job_timeout: Duration,
    job: &Job,
) -> Result<Value, GenerateError> {
    let request = CarouselRequest::from_payload(&job.payload)?;
    let progress = ProgressHandle::new(store, job.id, claimant);

    let deck = match tokio::time::timeout(job_timeout, generator.generate(&request, &progress))
        .await
    {
        Ok(inner) => inner?,
        Err(_) => {
            return Err(GenerateError::new(
                "TIMEOUT",
                format!("generation exceeded {}s", job_timeout.as_secs()),
            ))
        }
    };

    serde_json::to_value(&deck).map_err(|e| GenerateError::new("BAD_COMPLETION", e.to_string()))
}
