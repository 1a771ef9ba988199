use std::env;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use carouselflow::generate::{CarouselGenerator, CarouselRequest, MockGenerator};
use carouselflow::jobs::{
    JobProcessor, JobStore, MemoryJobStore, NewJob, PgJobStore, ProcessorConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "cflowctl <command>\n\
             Commands:\n\
             - demo\n\
             - reset\n\
             - seed <n>\n\
             - counts\n\
             - status <job_id>\n\
             - process <n>\n\
             \n\
             demo runs fully in memory; the rest use DATABASE_URL or TEST_DATABASE_URL.\n"
        );
        std::process::exit(2);
    }

    if args[1] == "demo" {
        return demo().await;
    }

    let url = env::var("DATABASE_URL")
        .or_else(|_| env::var("TEST_DATABASE_URL"))
        .expect("DATABASE_URL or TEST_DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;
    let store = PgJobStore::new(pool.clone());

    match args[1].as_str() {
        "reset" => {
            sqlx::query("TRUNCATE TABLE jobs RESTART IDENTITY CASCADE")
                .execute(&pool)
                .await?;
            println!("reset OK");
        }
        "seed" => {
            let n: i64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
            for i in 0..n {
                let prompt = if i % 2 == 0 {
                    format!("Demo deck {i}: product updates")
                } else {
                    format!("mock:fail:RATE_LIMIT demo flaky {i}")
                };
                let job = store
                    .create(NewJob::new("demo-user", payload_for(&prompt)?))
                    .await?;
                println!("+ inserted job id={} prompt={prompt:?}", job.id);
            }
        }
        "counts" => {
            let c = store.counts().await?;
            println!(
                "jobs: pending={} processing={} completed_last_60s={} failed_last_60s={}",
                c.pending, c.processing, c.completed_last_60s, c.failed_last_60s
            );
        }
        "status" => {
            let id = args.get(2).expect("usage: cflowctl status <job_id>");
            let job_id: Uuid = id.parse()?;
            match store.get(job_id).await? {
                Some(job) => print_job(&job),
                None => println!("not found: {job_id}"),
            }
        }
        "process" => {
            let n: i64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
            let processor = JobProcessor::new(
                Arc::new(store),
                Arc::new(MockGenerator::new()),
                ProcessorConfig {
                    instance_id: "cflowctl".to_string(),
                    ..Default::default()
                },
            );
            let s = processor.process_batch(n).await?;
            println!(
                "batch: reclaimed={} processed={} completed={} requeued={} failed={}",
                s.reclaimed, s.processed, s.completed, s.requeued, s.failed
            );
        }
        other => {
            eprintln!("Unknown command: {other}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn payload_for(prompt: &str) -> anyhow::Result<serde_json::Value> {
    let request = CarouselRequest {
        prompt: prompt.to_string(),
        slide_count: Some(3),
        tone: None,
    };
    Ok(serde_json::to_value(&request)?)
}

fn print_job(job: &carouselflow::jobs::Job) {
    println!(
        "JOB: id={} user={} status={} progress={}% retries={} error={:?} created_at={} updated_at={}",
        job.id,
        job.user_id,
        job.status,
        job.progress_percent,
        job.retry_count,
        job.error_message,
        job.created_at,
        job.updated_at
    );
}

/// End-to-end walkthrough against the in-memory store. Queues a couple of
/// decks plus one scripted provider failure, runs two batches and prints
/// what happened to each job.
async fn demo() -> anyhow::Result<()> {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let generator: Arc<dyn CarouselGenerator> = Arc::new(MockGenerator::new());
    let processor = JobProcessor::new(
        Arc::clone(&store),
        generator,
        ProcessorConfig::default(),
    );

    let prompts = [
        "Five ways to ship faster",
        "mock:fail:RATE_LIMIT flaky provider",
        "Onboarding checklist for new hires",
    ];

    let mut ids = Vec::new();
    for prompt in prompts {
        let job = store
            .create(NewJob::new("demo-user", payload_for(prompt)?))
            .await?;
        println!("+ queued job id={} prompt={prompt:?}", job.id);
        ids.push(job.id);
    }

    let s = processor.process_batch(10).await?;
    println!(
        "batch 1: processed={} completed={} requeued={} failed={}",
        s.processed, s.completed, s.requeued, s.failed
    );

    if s.requeued > 0 {
        println!("waiting for the retry window...");
        tokio::time::sleep(Duration::from_secs(3)).await;
        let s = processor.process_batch(10).await?;
        println!(
            "batch 2: processed={} completed={} requeued={} failed={}",
            s.processed, s.completed, s.requeued, s.failed
        );
    }

    for id in ids {
        if let Some(job) = store.get(id).await? {
            print_job(&job);
        }
    }

    Ok(())
}
