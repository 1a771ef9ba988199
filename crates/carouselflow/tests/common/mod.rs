use std::sync::Arc;
use std::time::Duration;

use carouselflow::generate::{CarouselRequest, MockGenerator};
use carouselflow::jobs::{Job, JobProcessor, JobStore, MemoryJobStore, NewJob, ProcessorConfig};

#[allow(dead_code)]
pub fn payload(prompt: &str) -> serde_json::Value {
    serde_json::to_value(CarouselRequest {
        prompt: prompt.to_string(),
        slide_count: Some(3),
        tone: None,
    })
    .expect("request payload serializes")
}

#[allow(dead_code)]
pub async fn seed_job(store: &dyn JobStore, user: &str, prompt: &str) -> Job {
    store
        .create(NewJob::new(user, payload(prompt)))
        .await
        .expect("failed to insert job")
}

#[allow(dead_code)]
pub fn test_config() -> ProcessorConfig {
    ProcessorConfig {
        instance_id: "test-1".to_string(),
        job_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn mock_processor(store: &MemoryJobStore) -> JobProcessor {
    JobProcessor::new(
        Arc::new(store.clone()),
        Arc::new(MockGenerator::new()),
        test_config(),
    )
}
