mod common;

use chrono::Utc;
use common::{mock_processor, seed_job};

use carouselflow::jobs::{JobStore, MemoryJobStore};

#[tokio::test]
async fn transient_failure_schedules_a_future_attempt() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    let job = seed_job(&store, "user-a", "mock:fail:RATE_LIMIT throttled").await;

    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.requeued, 1);
    assert_eq!(summary.failed, 0);

    let requeued = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(requeued.status, "pending");
    assert_eq!(requeued.retry_count, 1);
    assert_eq!(requeued.claimed_by, None);

    let next = requeued
        .next_attempt_at
        .expect("a retry time must be recorded");
    assert!(next > Utc::now(), "the retry must be in the future");

    let err = requeued.error_message.expect("failure reason recorded");
    assert!(err.contains("RATE_LIMIT"), "unexpected error: {err}");
}

#[tokio::test]
async fn a_requeued_job_is_not_picked_up_early() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    seed_job(&store, "user-a", "mock:fail:PROVIDER_DOWN outage").await;

    let first = processor.process_batch(10).await.unwrap();
    assert_eq!(first.requeued, 1);

    // The retry window has not elapsed, so the second invocation sees
    // nothing claimable.
    let second = processor.process_batch(10).await.unwrap();
    assert_eq!(second.processed, 0);
}

#[tokio::test]
async fn retries_stop_once_the_budget_is_spent() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    // Default budget: three retries after the initial attempt.
    let job = seed_job(&store, "user-a", "mock:fail:PROVIDER_DOWN outage").await;

    for expected_retry_count in 1..=3 {
        let summary = processor.process_batch(10).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.requeued, 1);

        let row = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.retry_count, expected_retry_count);

        store.make_due_now(job.id).await;
    }

    // Fourth attempt runs with the budget exhausted.
    let last = processor.process_batch(10).await.unwrap();
    assert_eq!(last.processed, 1);
    assert_eq!(last.requeued, 0);
    assert_eq!(last.failed, 1);

    let dead = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(dead.status, "failed");
    assert_eq!(dead.retry_count, 4, "every failed attempt is counted");
    assert_eq!(dead.next_attempt_at, None);

    // Nothing left to claim.
    let after = processor.process_batch(10).await.unwrap();
    assert_eq!(after.processed, 0);
}

#[tokio::test]
async fn malformed_payload_fails_without_retrying() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    let job = store
        .create(carouselflow::jobs::NewJob::new(
            "user-a",
            serde_json::json!({"not": "a request"}),
        ))
        .await
        .unwrap();

    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.requeued, 0, "a bad payload never gets better");

    let dead = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(dead.status, "failed");
    assert_eq!(dead.retry_count, 1);
    assert!(dead
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("BAD_PAYLOAD"));
}

#[tokio::test]
async fn scripted_bad_completion_is_retried() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    let job = seed_job(&store, "user-a", "mock:fail:BAD_COMPLETION garbled").await;

    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.requeued, 1, "a garbled completion is worth retrying");

    let row = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(row.status, "pending");
    assert_eq!(row.retry_count, 1);
}
