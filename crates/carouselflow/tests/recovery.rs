mod common;

use chrono::Duration;
use common::{mock_processor, seed_job};

use carouselflow::jobs::{JobStore, MemoryJobStore};

#[tokio::test]
async fn stale_claims_are_reclaimed_and_rerun() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    // A job claimed by an instance that died mid-flight.
    let job = seed_job(&store, "user-a", "orphaned deck").await;
    let claimed = store.claim_batch("instance-dead", 1).await.unwrap();
    assert_eq!(claimed.len(), 1);
    store
        .backdate_updated_at(job.id, Duration::seconds(600))
        .await;

    // The next invocation sweeps it back to pending and picks it up itself.
    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.reclaimed, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.completed, 1);

    let done = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(done.status, "completed");
}

#[tokio::test]
async fn live_claims_survive_the_sweep() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    let job = seed_job(&store, "user-a", "in flight").await;
    let claimed = store.claim_batch("instance-busy", 1).await.unwrap();
    assert_eq!(claimed.len(), 1);

    let summary = processor.process_batch(10).await.unwrap();
    assert_eq!(summary.reclaimed, 0, "a fresh claim is not stale");
    assert_eq!(summary.processed, 0, "an owned job is not claimable");

    let row = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(row.status, "processing");
    assert_eq!(row.claimed_by.as_deref(), Some("instance-busy"));
}

#[tokio::test]
async fn the_sweep_releases_without_touching_history() {
    let store = MemoryJobStore::new();

    let job = seed_job(&store, "user-a", "half done").await;
    store.claim_batch("instance-dead", 1).await.unwrap();
    assert!(store
        .update_progress(job.id, "instance-dead", 40, Some("Drafting slides"))
        .await
        .unwrap());
    store
        .backdate_updated_at(job.id, Duration::seconds(600))
        .await;

    let released = store.release_stale(Duration::seconds(300)).await.unwrap();
    assert_eq!(released, 1);

    let row = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(row.status, "pending");
    assert_eq!(row.claimed_by, None);
    assert_eq!(row.progress_percent, 40, "progress survives the release");
    assert_eq!(row.retry_count, 0, "the sweep is not a failed attempt");
    assert_eq!(row.error_message, None);
}

#[tokio::test]
async fn heartbeats_keep_a_claim_out_of_the_sweep() {
    let store = MemoryJobStore::new();

    let job = seed_job(&store, "user-a", "slow but alive").await;
    store.claim_batch("instance-busy", 1).await.unwrap();
    store
        .backdate_updated_at(job.id, Duration::seconds(600))
        .await;

    // A progress write refreshes updated_at, so the job no longer looks dead.
    assert!(store
        .update_progress(job.id, "instance-busy", 10, Some("still going"))
        .await
        .unwrap());

    let released = store.release_stale(Duration::seconds(300)).await.unwrap();
    assert_eq!(released, 0, "a heartbeat must reset the staleness clock");

    let row = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(row.status, "processing");
}

#[tokio::test]
async fn a_zero_limit_invocation_still_sweeps() {
    let store = MemoryJobStore::new();
    let processor = mock_processor(&store);

    let job = seed_job(&store, "user-a", "orphaned deck").await;
    store.claim_batch("instance-dead", 1).await.unwrap();
    store
        .backdate_updated_at(job.id, Duration::seconds(600))
        .await;

    let summary = processor.process_batch(0).await.unwrap();
    assert_eq!(summary.reclaimed, 1);
    assert_eq!(summary.processed, 0);

    let row = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(row.status, "pending", "released but not rerun at limit zero");
}
