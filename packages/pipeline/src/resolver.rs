//! Shared completion-resolution logic.
//!
//! Both completion detectors (the poller and the webhook endpoint) learn
//! about a finished external job and call [`resolve`]. Only the transport
//! differs between them; the idempotency check, failure classification,
//! mutation, and stage chaining all live here.

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::classify;
use crate::config::{StageDescriptor, StageGraph};
use crate::store::LeadStore;
use crate::types::{Stage, StageState, StageStatus};

/// Terminal outcome of an external job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed { result: serde_json::Value },
    Failed { error: String },
}

/// What resolving a job notification did to the lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Stage completed; next stage (if any) queued
    Completed,
    /// Stage terminally failed
    Failed,
    /// Transient failure, stage re-entered the queue
    Requeued,
    /// Nothing to do: stage already resolved, or the notification refers
    /// to a superseded attempt
    AlreadyProcessed,
    /// No such lead/stage row
    NotFound,
}

/// Resolve a terminal job outcome against a lead's stage row.
pub async fn resolve(
    store: &dyn LeadStore,
    graph: &StageGraph,
    lead_id: Uuid,
    stage: Stage,
    job_id: &str,
    outcome: JobOutcome,
) -> Result<Resolution> {
    let Some(state) = store.stage_state(lead_id, stage).await? else {
        return Ok(Resolution::NotFound);
    };

    let descriptor = graph.descriptor(stage);

    // Idempotency: terminal rows and superseded attempts are left alone.
    if state.status.is_terminal() {
        return Ok(Resolution::AlreadyProcessed);
    }
    if state.status != StageStatus::Started || state.job_id.as_deref() != Some(job_id) {
        // The reclaimer requeued this attempt (or a new one is in flight)
        // before the notification arrived. Benign duplicate; ignore it.
        warn!(
            lead_id = %lead_id,
            stage = %stage,
            job_id = %job_id,
            current_status = ?state.status,
            "dropping result for superseded job attempt"
        );
        return Ok(Resolution::AlreadyProcessed);
    }

    match outcome {
        JobOutcome::Completed { result } => {
            if store
                .complete_stage(lead_id, stage, &result, descriptor.next)
                .await?
            {
                info!(
                    lead_id = %lead_id,
                    stage = %stage,
                    next = ?descriptor.next,
                    "stage completed"
                );
                Ok(Resolution::Completed)
            } else {
                // Lost the race against the reclaimer between our read and
                // this write. The attempt was requeued and will re-run.
                warn!(lead_id = %lead_id, stage = %stage, "duplicate result dropped by conditional update");
                Ok(Resolution::AlreadyProcessed)
            }
        }
        JobOutcome::Failed { error } => {
            apply_failure(store, descriptor, &state, &error).await
        }
    }
}

/// Apply the shared failure policy to a `started` stage row.
///
/// Hard failures terminalize immediately; retriable/unknown failures
/// consume one retry and requeue while budget remains. The submitter uses
/// this for submission errors and the resolver for job-level failures.
pub async fn apply_failure(
    store: &dyn LeadStore,
    descriptor: &StageDescriptor,
    state: &StageState,
    error: &str,
) -> Result<Resolution> {
    let kind = classify(error);
    let lead_id = state.lead_id;
    let stage = state.stage;

    let resolution = if kind.should_retry() && state.retry_count < descriptor.max_retries {
        if store.requeue_stage(lead_id, stage, error).await? {
            Resolution::Requeued
        } else {
            Resolution::AlreadyProcessed
        }
    } else if store.fail_stage(lead_id, stage, error).await? {
        Resolution::Failed
    } else {
        Resolution::AlreadyProcessed
    };

    match resolution {
        Resolution::Requeued => info!(
            lead_id = %lead_id,
            stage = %stage,
            kind = ?kind,
            retry_count = state.retry_count + 1,
            error,
            "stage requeued after failure"
        ),
        Resolution::Failed => warn!(
            lead_id = %lead_id,
            stage = %stage,
            kind = ?kind,
            error,
            "stage terminally failed"
        ),
        _ => warn!(
            lead_id = %lead_id,
            stage = %stage,
            "duplicate failure dropped by conditional update"
        ),
    }

    Ok(resolution)
}
