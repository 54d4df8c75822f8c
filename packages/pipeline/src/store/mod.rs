//! Persistence layer for leads, stage states, and the webhook log.
//!
//! The store is the single shared mutable resource of the pipeline. Every
//! write is a single-row conditional update (the completion+chain pair
//! shares one transaction) so concurrent workers coordinate purely through
//! row state, never through in-process locks.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::types::{Lead, Stage, StageState, WebhookEvent};

pub mod postgres;
pub use postgres::PostgresLeadStore;

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert a lead and seed one `pending` stage row per stage.
    async fn insert_lead(&self, lead: &Lead, stages: &[Stage]) -> Result<()>;

    async fn get_lead(&self, lead_id: Uuid) -> Result<Option<Lead>>;

    async fn stage_state(&self, lead_id: Uuid, stage: Stage) -> Result<Option<StageState>>;

    /// All stage rows for a lead, in stage order.
    async fn stage_states(&self, lead_id: Uuid) -> Result<Vec<StageState>>;

    /// `pending -> queued`. Returns false if the stage was not pending.
    async fn trigger_stage(&self, lead_id: Uuid, stage: Stage) -> Result<bool>;

    /// Manual retry: `failed -> queued`, clearing `job_id` and `error`.
    /// `retry_count` is monotone and is deliberately kept.
    async fn retry_stage(&self, lead_id: Uuid, stage: Stage) -> Result<bool>;

    /// Atomically claim up to `limit` queued leads for `stage`, oldest
    /// first, flipping them to `started`. Rows locked by a concurrent
    /// claimer are skipped, never waited on. Empty result is not an error.
    async fn claim_queued(&self, stage: Stage, limit: i64) -> Result<Vec<StageState>>;

    /// Record a successful submission: set `job_id`, status stays `started`.
    async fn record_submission(&self, lead_id: Uuid, stage: Stage, job_id: &str) -> Result<bool>;

    /// Stage rows currently `started` with a non-null `job_id`.
    async fn started_with_job(&self, stage: Stage) -> Result<Vec<StageState>>;

    /// Terminally fail stuck rows that have exhausted their retry budget.
    /// Returns the number of rows failed.
    async fn fail_stuck(&self, stage: Stage, older_than: Duration, max_retries: i32)
        -> Result<u64>;

    /// Requeue stuck rows with budget remaining: increment `retry_count`,
    /// clear `job_id`/`started_at`, flip to `queued`. Returns the count.
    async fn requeue_stuck(
        &self,
        stage: Stage,
        older_than: Duration,
        max_retries: i32,
    ) -> Result<u64>;

    /// Resolve a stage successfully: write `result`, flip to `completed`,
    /// stamp `completed_at`, and queue `next` (if any) in the same
    /// transaction. Conditional on the row still being `started`; returns
    /// false when a concurrent writer got there first.
    async fn complete_stage(
        &self,
        lead_id: Uuid,
        stage: Stage,
        result: &serde_json::Value,
        next: Option<Stage>,
    ) -> Result<bool>;

    /// Terminally fail a `started` stage. Returns false on a lost race.
    async fn fail_stage(&self, lead_id: Uuid, stage: Stage, error: &str) -> Result<bool>;

    /// Send a `started` stage back to the queue after a transient failure:
    /// increment `retry_count`, record `error`, clear `job_id`/`started_at`.
    /// Returns false on a lost race.
    async fn requeue_stage(&self, lead_id: Uuid, stage: Stage, error: &str) -> Result<bool>;

    /// Append a completion notification to the webhook log. Returns `None`
    /// when the fingerprint was already recorded (duplicate delivery).
    async fn insert_webhook_event(
        &self,
        fingerprint: &str,
        payload: &serde_json::Value,
    ) -> Result<Option<WebhookEvent>>;

    async fn mark_webhook_processed(&self, event_id: Uuid) -> Result<()>;
}
