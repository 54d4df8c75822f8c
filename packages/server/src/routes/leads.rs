//! Lead intake and read endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use pipeline::{Lead, Stage, StageState};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub company_name: Option<String>,
    pub website_url: String,
}

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    #[serde(flatten)]
    pub lead: Lead,
    pub stages: Vec<StageState>,
}

/// Create a lead and queue it for the first pipeline stage.
pub async fn create_lead_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<LeadResponse>), (StatusCode, Json<serde_json::Value>)> {
    if payload.website_url.trim().is_empty() {
        return Err(bad_request("website_url is required"));
    }

    let lead = Lead::new(payload.company_name, payload.website_url.trim().to_string());
    let stages: Vec<Stage> = state.graph.stages().iter().map(|d| d.stage).collect();

    state
        .store
        .insert_lead(&lead, &stages)
        .await
        .map_err(internal_error)?;
    state
        .store
        .trigger_stage(lead.id, state.graph.first())
        .await
        .map_err(internal_error)?;

    info!(lead_id = %lead.id, url = %lead.website_url, "lead created and queued");

    let stages = state
        .store
        .stage_states(lead.id)
        .await
        .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(LeadResponse { lead, stages })))
}

/// Fetch a lead with its per-stage status blocks.
pub async fn get_lead_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadResponse>, (StatusCode, Json<serde_json::Value>)> {
    let lead = state
        .store
        .get_lead(id)
        .await
        .map_err(internal_error)?
        .ok_or_else(not_found)?;

    let stages = state.store.stage_states(id).await.map_err(internal_error)?;

    Ok(Json(LeadResponse { lead, stages }))
}

/// Manually retry a failed stage. The only way out of `failed`.
pub async fn retry_stage_handler(
    State(state): State<AppState>,
    Path((id, stage)): Path<(Uuid, Stage)>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let retried = state
        .store
        .retry_stage(id, stage)
        .await
        .map_err(internal_error)?;

    if retried {
        info!(lead_id = %id, stage = %stage, "stage manually requeued");
        Ok(Json(serde_json::json!({ "status": "queued" })))
    } else {
        Err(bad_request("stage is not in a failed state"))
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}

fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "lead not found" })),
    )
}

fn internal_error(e: anyhow::Error) -> (StatusCode, Json<serde_json::Value>) {
    error!(error = %e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "internal error" })),
    )
}
