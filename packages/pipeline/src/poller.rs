//! Polling completion detector.
//!
//! Periodically asks the external service for the status of every
//! in-flight job of a stage and routes terminal answers through the
//! shared resolver. Jobs still pending or processing are left for the
//! next cycle, as is anything behind a transport error.

use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{PipelineConfig, StageGraph};
use crate::resolver::{resolve, JobOutcome, Resolution};
use crate::services::{ServiceJobStatus, ServiceRegistry};
use crate::store::LeadStore;
use crate::supervisor::Service;
use crate::types::{Stage, StageState};

/// Outcome counts for one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub completed: usize,
    pub failed: usize,
    pub requeued: usize,
}

pub struct PollWorker {
    store: Arc<dyn LeadStore>,
    graph: StageGraph,
    services: Arc<ServiceRegistry>,
    stage: Stage,
    config: PipelineConfig,
}

impl PollWorker {
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

    /// Query every in-flight job once, with bounded concurrency.
    pub async fn run_cycle(&self) -> Result<PollStats> {
        let in_flight = self.store.started_with_job(self.stage).await?;
        if in_flight.is_empty() {
            return Ok(PollStats::default());
        }

        debug!(stage = %self.stage, count = in_flight.len(), "polling in-flight jobs");

        let resolutions: Vec<Option<Resolution>> = stream::iter(in_flight.into_iter())
            .map(|state| async move { self.check_one(&state).await })
            .buffer_unordered(self.config.poll_concurrency)
            .collect()
            .await;

        let mut stats = PollStats::default();
        for resolution in resolutions.into_iter().flatten() {
            match resolution {
                Resolution::Completed => stats.completed += 1,
                Resolution::Failed => stats.failed += 1,
                Resolution::Requeued => stats.requeued += 1,
                Resolution::AlreadyProcessed | Resolution::NotFound => {}
            }
        }

        if stats.completed > 0 || stats.failed > 0 || stats.requeued > 0 {
            info!(
                stage = %self.stage,
                completed = stats.completed,
                failed = stats.failed,
                requeued = stats.requeued,
                "poll cycle resolved jobs"
            );
        }

        Ok(stats)
    }

    /// Check one job; `None` when nothing was resolved.
    async fn check_one(&self, state: &StageState) -> Option<Resolution> {
        let descriptor = self.graph.descriptor(self.stage);
        let job_id = state.job_id.as_deref()?;

        let service = match self.services.get(descriptor.service) {
            Ok(service) => service,
            Err(e) => {
                error!(stage = %self.stage, error = %e, "service lookup failed");
                return None;
            }
        };

        let status = match service.status(job_id).await {
            Ok(status) => status,
            Err(e) => {
                // Ambiguous: "service unreachable" must not be read as
                // "job failed". Leave the row alone for the next cycle.
                warn!(
                    lead_id = %state.lead_id,
                    stage = %self.stage,
                    job_id = %job_id,
                    error = %e,
                    "status query failed, will retry next cycle"
                );
                return None;
            }
        };

        let outcome = match status {
            ServiceJobStatus::Pending | ServiceJobStatus::Processing => return None,
            ServiceJobStatus::Completed { result } => JobOutcome::Completed { result },
            ServiceJobStatus::Failed { error } => JobOutcome::Failed { error },
        };

        match resolve(
            self.store.as_ref(),
            &self.graph,
            state.lead_id,
            self.stage,
            job_id,
            outcome,
        )
        .await
        {
            Ok(resolution) => Some(resolution),
            Err(e) => {
                error!(
                    lead_id = %state.lead_id,
                    stage = %self.stage,
                    error = %e,
                    "failed to resolve polled job"
                );
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for PollWorker {
    fn name(&self) -> &'static str {
        match self.stage {
            Stage::Scrape => "poll-worker-scrape",
            Stage::Enrich => "poll-worker-enrich",
        }
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(stage = %self.stage, "poll worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.run_cycle().await {
                error!(stage = %self.stage, error = %e, "poll cycle failed");
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(stage = %self.stage, "poll worker stopped");
        Ok(())
    }
}
