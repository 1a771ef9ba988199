/// Runtime configuration, loaded from the environment once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub instance_id: String,
    /// Shared secret for the processing trigger. None means the trigger
    /// rejects every POST with MISSING_ENV.
    pub job_key: Option<String>,
    pub batch_size: i64,
    pub job_timeout_seconds: u64,
    pub stale_after_seconds: i64,
    pub migrate_on_startup: bool,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let bind_addr = env_or_fallback("CFLOW_BIND_ADDR", "BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let instance_id = env_or_fallback("CFLOW_INSTANCE_ID", "INSTANCE_ID")
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "cflow-1".to_string());

        let job_key = std::env::var("JOB_PROCESSOR_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let batch_size = env_or_fallback("CFLOW_BATCH_SIZE", "BATCH_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let job_timeout_seconds =
            env_or_fallback("CFLOW_JOB_TIMEOUT_SECONDS", "JOB_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

        let stale_after_seconds = env_or_fallback("CFLOW_STALE_AFTER_SECONDS", "STALE_AFTER_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        let migrate_on_startup = env_bool("CFLOW_MIGRATE_ON_STARTUP").unwrap_or(true);

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let openai_base_url = env_or_fallback("CFLOW_OPENAI_BASE_URL", "OPENAI_BASE_URL")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let openai_model = env_or_fallback("CFLOW_OPENAI_MODEL", "OPENAI_MODEL")
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            instance_id,
            job_key,
            batch_size,
            job_timeout_seconds,
            stale_after_seconds,
            migrate_on_startup,
            openai_api_key,
            openai_base_url,
            openai_model,
        })
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
