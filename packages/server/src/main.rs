// Main entry point for the leadflow server

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeline::{
    PollWorker, PostgresLeadStore, ServiceKind, ServiceRegistry, StageGraph, StageWorker,
    Supervisor,
};
use server_core::services::{ApifyScrapeService, OpenAiBatchService};
use server_core::{build_app, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,pipeline=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting leadflow server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    // Wire up the pipeline
    let store = Arc::new(PostgresLeadStore::new(pool.clone()));
    let graph = StageGraph::standard(&config.pipeline);
    let services = Arc::new(
        ServiceRegistry::new()
            .register(
                ServiceKind::Scraper,
                Arc::new(ApifyScrapeService::new(config.apify_token.clone())),
            )
            .register(
                ServiceKind::LlmBatch,
                Arc::new(
                    OpenAiBatchService::new(config.openai_api_key.clone())
                        .context("Failed to create OpenAI client")?,
                ),
            ),
    );

    let mut supervisor = Supervisor::new();
    for descriptor in graph.stages() {
        supervisor.add(Box::new(StageWorker::new(
            store.clone(),
            graph.clone(),
            services.clone(),
            descriptor.stage,
            config.pipeline.clone(),
        )));
        supervisor.add(Box::new(PollWorker::new(
            store.clone(),
            graph.clone(),
            services.clone(),
            descriptor.stage,
            config.pipeline.clone(),
        )));
    }
    supervisor.start();

    // Build the HTTP app
    let state = AppState {
        db_pool: pool,
        store,
        graph,
        webhook_secret: config.webhook_secret.clone(),
    };
    let app = build_app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down workers...");
    supervisor.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}
