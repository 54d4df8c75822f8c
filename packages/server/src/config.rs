use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use pipeline::PipelineConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub apify_token: String,
    pub openai_api_key: String,
    /// Shared secret for webhook signatures. When unset, the webhook
    /// endpoint accepts unsigned payloads (development mode).
    pub webhook_secret: Option<String>,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            claim_batch_size: env_or("CLAIM_BATCH_SIZE", defaults.claim_batch_size)?,
            poll_interval: Duration::from_millis(env_or(
                "POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            poll_concurrency: env_or("POLL_CONCURRENCY", defaults.poll_concurrency)?,
            max_retries: env_or("MAX_RETRIES", defaults.max_retries)?,
            stuck_timeout: Duration::from_millis(env_or(
                "STUCK_TIMEOUT_MS",
                defaults.stuck_timeout.as_millis() as u64,
            )?),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            apify_token: env::var("APIFY_TOKEN").context("APIFY_TOKEN must be set")?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            webhook_secret: env::var("WEBHOOK_SECRET").ok(),
            pipeline,
        })
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be a valid number")),
        Err(_) => Ok(default),
    }
}
