use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carouselflow::api::{self, ApiState};
use carouselflow::auth::TriggerAuth;
use carouselflow::generate::{CarouselGenerator, MockGenerator, OpenAiGenerator};
use carouselflow::jobs::{JobProcessor, JobStore, PgJobStore, ProcessorConfig};
use carouselflow::{db, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,carouselflow=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cfg = Config::from_env()?;
    let trigger_auth = if cfg.job_key.is_some() {
        "enabled"
    } else {
        "missing"
    };
    tracing::info!(
        instance = %cfg.instance_id,
        bind = %cfg.bind_addr,
        batch_size = cfg.batch_size,
        job_timeout_s = cfg.job_timeout_seconds,
        stale_after_s = cfg.stale_after_seconds,
        trigger_auth,
        "carouselflow starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));

    let generator: Arc<dyn CarouselGenerator> = match &cfg.openai_api_key {
        Some(key) => Arc::new(
            OpenAiGenerator::new(key.clone())
                .with_model(cfg.openai_model.clone())
                .with_base_url(cfg.openai_base_url.clone()),
        ),
        None => {
            tracing::warn!("OPENAI_API_KEY not set, serving scripted decks");
            Arc::new(MockGenerator::new())
        }
    };

    let processor = Arc::new(JobProcessor::new(
        Arc::clone(&store),
        generator,
        ProcessorConfig {
            instance_id: cfg.instance_id.clone(),
            job_timeout: std::time::Duration::from_secs(cfg.job_timeout_seconds),
            stale_after: chrono::Duration::seconds(cfg.stale_after_seconds),
            ..Default::default()
        },
    ));

    let state = ApiState {
        store,
        processor,
        trigger: TriggerAuth::new(cfg.job_key.clone()),
        batch_size: cfg.batch_size,
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
