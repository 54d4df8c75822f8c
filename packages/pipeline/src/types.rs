//! Models for leads and their per-stage processing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A processing stage in the lead pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "stage_name", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scrape,
    Enrich,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Enrich => "enrich",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one stage for one lead.
///
/// Exactly one status holds per (lead, stage) at any instant. `Completed`
/// and `Failed` are terminal for the stage; leaving `Failed` requires an
/// explicit retry action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "stage_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Queued,
    Started,
    Completed,
    Failed,
}

impl StageStatus {
    /// Terminal statuses never change without external intervention.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

/// A lead: a company prospect identified by its website.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub company_name: Option<String>,
    pub website_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(company_name: Option<String>, website_url: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            company_name,
            website_url,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One row of the `lead_stage_states` table: the status block for a
/// single (lead, stage) pair.
///
/// `job_id` is set when a submission succeeds and cleared on requeue, so a
/// non-null `job_id` means an external job is (or was, terminally) in
/// flight for the current attempt.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    pub lead_id: Uuid,
    pub stage: Stage,
    pub status: StageStatus,
    pub job_id: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An inbound completion notification recorded in the append-only
/// webhook log, keyed by a content fingerprint of the raw payload.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub fingerprint: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}
