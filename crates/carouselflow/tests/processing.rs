mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{mock_processor, seed_job, test_config};

use carouselflow::generate::{CarouselDeck, MockGenerator};
use carouselflow::jobs::{JobProcessor, JobStore, MemoryJobStore};

#[tokio::test]
async fn batch_processes_only_up_to_the_limit() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    for i in 0..5 {
        seed_job(&store, "user-a", &format!("deck {i}")).await;
    }

    let summary = processor.process_batch(3).await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.completed, 3);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.pending, 2, "two jobs should remain unclaimed");
}

#[tokio::test]
async fn successful_job_ends_completed_with_a_deck() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    let job = seed_job(&store, "user-a", "Five ways to ship faster").await;

    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.completed, 1);

    let done = store.get(job.id).await.unwrap().expect("job still exists");
    assert_eq!(done.status, "completed");
    assert_eq!(done.progress_percent, 100);
    assert_eq!(done.error_message, None);
    assert_eq!(done.claimed_by, None);

    let deck: CarouselDeck =
        serde_json::from_value(done.result.expect("completed job has a result")).unwrap();
    assert_eq!(deck.slides.len(), 3, "payload asked for three slides");
}

#[tokio::test]
async fn one_bad_job_does_not_poison_the_batch() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    let ok_a = seed_job(&store, "user-a", "deck one").await;
    let bad = seed_job(&store, "user-a", "mock:fail:BAD_PROMPT rejected").await;
    let ok_b = seed_job(&store, "user-a", "deck two").await;

    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.requeued, 0, "BAD_PROMPT is not retryable");

    for id in [ok_a.id, ok_b.id] {
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, "completed", "healthy jobs must still finish");
    }

    let failed = store.get(bad.id).await.unwrap().unwrap();
    assert_eq!(failed.status, "failed");
    assert_eq!(failed.retry_count, 1, "the failed attempt is recorded");
    let err = failed.error_message.expect("failure reason recorded");
    assert!(err.contains("BAD_PROMPT"), "unexpected error: {err}");
}

#[tokio::test]
async fn panicking_generator_does_not_strand_the_claim() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    let panicking = seed_job(&store, "user-a", "mock:panic boom").await;
    let healthy = seed_job(&store, "user-a", "still fine").await;

    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.requeued, 1, "panic is treated as a transient failure");

    let crashed = store.get(panicking.id).await.unwrap().unwrap();
    assert_eq!(
        crashed.status, "pending",
        "panicked job must be requeued, not left processing"
    );
    assert_eq!(crashed.retry_count, 1);
    assert!(crashed
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("PANIC"));

    let fine = store.get(healthy.id).await.unwrap().unwrap();
    assert_eq!(fine.status, "completed");
}

#[tokio::test]
async fn slow_generation_times_out_and_requeues() {
    let store = MemoryJobStore::new();
    let mut cfg = test_config();
    cfg.job_timeout = Duration::from_millis(100);
    let processor = JobProcessor::new(
        Arc::new(store.clone()),
        Arc::new(MockGenerator::new()),
        cfg,
    );

    let slow = seed_job(&store, "user-a", "mock:sleep:5000 giant deck").await;

    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.requeued, 1);

    let job = store.get(slow.id).await.unwrap().unwrap();
    assert_eq!(job.status, "pending");
    assert!(job
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("TIMEOUT"));
}

#[tokio::test]
async fn progress_never_moves_backwards() {
    let store = MemoryJobStore::new();
    let job = seed_job(&store, "user-a", "deck").await;

    let claimed = store.claim_batch("test-1", 1).await.unwrap();
    assert_eq!(claimed.len(), 1);

    assert!(store
        .update_progress(job.id, "test-1", 40, Some("Drafting slides"))
        .await
        .unwrap());
    let at_40 = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(at_40.progress_percent, 40);

    // A late lower report is accepted but must not regress the percent.
    assert!(store
        .update_progress(job.id, "test-1", 25, None)
        .await
        .unwrap());
    let still_40 = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(still_40.progress_percent, 40);
    assert_eq!(
        still_40.progress_message.as_deref(),
        Some("Drafting slides"),
        "a report without a message keeps the previous one"
    );

    assert!(store
        .update_progress(job.id, "test-1", 70, Some("Polishing"))
        .await
        .unwrap());
    let at_70 = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(at_70.progress_percent, 70);
    assert_eq!(at_70.progress_message.as_deref(), Some("Polishing"));
}

#[tokio::test]
async fn requeue_keeps_the_progress_already_reported() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    // The scripted failure reports 35% before erroring out.
    let job = seed_job(&store, "user-a", "mock:fail:RATE_LIMIT throttled").await;

    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.requeued, 1);

    let requeued = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(requeued.status, "pending");
    assert_eq!(
        requeued.progress_percent, 35,
        "requeueing must not reset progress"
    );
    assert_eq!(requeued.retry_count, 1);
}

#[tokio::test]
async fn progress_updates_from_a_stale_claimant_are_ignored() {
    let store = MemoryJobStore::new();
    let job = seed_job(&store, "user-a", "deck").await;

    let claimed = store.claim_batch("owner", 1).await.unwrap();
    assert_eq!(claimed.len(), 1);

    let accepted = store
        .update_progress(job.id, "impostor", 90, Some("hijack"))
        .await
        .unwrap();
    assert!(!accepted, "writes without the claim must be refused");

    let unchanged = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(unchanged.progress_percent, 0);
    assert_eq!(unchanged.progress_message, None);
}
