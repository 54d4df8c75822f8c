//! Per-stage claim-and-submit worker loop.
//!
//! Each cycle: reclaim stuck leads, atomically claim a batch of queued
//! leads, and submit each claimed lead to the stage's external service.
//! Cycle-level errors abort the cycle and are retried on the next tick;
//! they never leave a row half-written.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{PipelineConfig, StageGraph};
use crate::reclaim::reclaim;
use crate::resolver::apply_failure;
use crate::services::ServiceRegistry;
use crate::store::LeadStore;
use crate::supervisor::Service;
use crate::types::{Stage, StageState};

pub struct StageWorker {
    store: Arc<dyn LeadStore>,
    graph: StageGraph,
    services: Arc<ServiceRegistry>,
    stage: Stage,
    config: PipelineConfig,
}

impl StageWorker {
    pub fn new(
        store: Arc<dyn LeadStore>,
        graph: StageGraph,
        services: Arc<ServiceRegistry>,
        stage: Stage,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            graph,
            services,
            stage,
            config,
        }
    }

    /// One reclaim + claim + submit pass. Returns the number of leads
    /// claimed.
    pub async fn run_cycle(&self) -> Result<usize> {
        let descriptor = self.graph.descriptor(self.stage);

        // Stale work re-enters the pool before new claims are issued.
        reclaim(self.store.as_ref(), descriptor).await?;

        let claimed = self
            .store
            .claim_queued(self.stage, self.config.claim_batch_size)
            .await?;

        if claimed.is_empty() {
            return Ok(0);
        }

        debug!(stage = %self.stage, count = claimed.len(), "claimed leads");

        let count = claimed.len();
        join_all(claimed.iter().map(|state| self.submit_one(state))).await;
        Ok(count)
    }

    /// Submit one claimed lead to the stage's service.
    async fn submit_one(&self, state: &StageState) {
        let descriptor = self.graph.descriptor(self.stage);

        let service = match self.services.get(descriptor.service) {
            Ok(service) => service,
            Err(e) => {
                error!(stage = %self.stage, error = %e, "service lookup failed");
                return;
            }
        };

        let lead = match self.store.get_lead(state.lead_id).await {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                error!(lead_id = %state.lead_id, "claimed stage row has no lead record");
                return;
            }
            Err(e) => {
                // Infrastructure error: leave the row started, the
                // reclaimer will recover it if we never come back.
                warn!(lead_id = %state.lead_id, error = %e, "lead lookup failed, leaving for reclaim");
                return;
            }
        };

        let prior_result = match self.graph.predecessor(self.stage) {
            Some(prior_stage) => match self.store.stage_state(state.lead_id, prior_stage).await {
                Ok(prior) => prior.and_then(|p| p.result),
                Err(e) => {
                    warn!(lead_id = %state.lead_id, error = %e, "prior result lookup failed, leaving for reclaim");
                    return;
                }
            },
            None => None,
        };

        match service.submit(&lead, prior_result.as_ref()).await {
            Ok(job_id) => {
                info!(
                    lead_id = %state.lead_id,
                    stage = %self.stage,
                    job_id = %job_id,
                    "submitted to external service"
                );
                if let Err(e) = self
                    .store
                    .record_submission(state.lead_id, self.stage, &job_id)
                    .await
                {
                    // The job is running but we could not persist its id;
                    // the reclaimer will requeue this attempt.
                    error!(lead_id = %state.lead_id, job_id = %job_id, error = %e, "failed to record job id");
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                if let Err(e) =
                    apply_failure(self.store.as_ref(), descriptor, state, &message).await
                {
                    error!(lead_id = %state.lead_id, error = %e, "failed to record submission failure");
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for StageWorker {
    fn name(&self) -> &'static str {
        match self.stage {
            Stage::Scrape => "stage-worker-scrape",
            Stage::Enrich => "stage-worker-enrich",
        }
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(
            stage = %self.stage,
            batch_size = self.config.claim_batch_size,
            "stage worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_cycle().await {
                Ok(0) => {}
                Ok(count) => {
                    debug!(stage = %self.stage, count, "cycle submitted leads");
                    // More work may be queued behind the batch limit.
                    continue;
                }
                Err(e) => {
                    error!(stage = %self.stage, error = %e, "claim cycle failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(stage = %self.stage, "stage worker stopped");
        Ok(())
    }
}
