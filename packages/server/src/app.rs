//! Application setup and router wiring.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use pipeline::{LeadStore, StageGraph};

use crate::routes::{
    create_lead_handler, get_lead_handler, health_handler, job_complete_handler,
    retry_stage_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub store: Arc<dyn LeadStore>,
    pub graph: StageGraph,
    pub webhook_secret: Option<String>,
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/leads", post(create_lead_handler))
        .route("/leads/:id", get(get_lead_handler))
        .route("/leads/:id/stages/:stage/retry", post(retry_stage_handler))
        .route("/job-complete", post(job_complete_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
