//! Static stage-graph configuration.
//!
//! Built once at process start and never mutated at runtime. The stage
//! ordering lives in code; the tunable knobs (retry budgets, timeouts,
//! batch sizes) come from [`PipelineConfig`].

use std::time::Duration;

use crate::services::ServiceKind;
use crate::types::Stage;

/// Tunable knobs for the pipeline, typically loaded from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of leads to claim per cycle
    pub claim_batch_size: i64,
    /// How long to wait between claim/poll cycles
    pub poll_interval: Duration,
    /// Maximum concurrent status queries per poll cycle
    pub poll_concurrency: usize,
    /// Retry budget per stage
    pub max_retries: i32,
    /// How long a lead may sit in `started` before it is reclaimed
    pub stuck_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            claim_batch_size: 10,
            poll_interval: Duration::from_secs(15),
            poll_concurrency: 8,
            max_retries: 3,
            stuck_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Immutable description of one stage: its place in the pipeline, the
/// external service that handles it, and its failure policy.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub stage: Stage,
    /// Stage queued when this one completes; `None` for the terminal stage
    pub next: Option<Stage>,
    pub service: ServiceKind,
    pub max_retries: i32,
    pub stuck_timeout: Duration,
}

/// The ordered stage graph. Created at startup, shared read-only.
#[derive(Debug, Clone)]
pub struct StageGraph {
    stages: Vec<StageDescriptor>,
}

impl StageGraph {
    /// The standard two-stage lead pipeline: scrape, then enrich.
    pub fn standard(config: &PipelineConfig) -> Self {
        Self {
            stages: vec![
                StageDescriptor {
                    stage: Stage::Scrape,
                    next: Some(Stage::Enrich),
                    service: ServiceKind::Scraper,
                    max_retries: config.max_retries,
                    stuck_timeout: config.stuck_timeout,
                },
                StageDescriptor {
                    stage: Stage::Enrich,
                    next: None,
                    service: ServiceKind::LlmBatch,
                    max_retries: config.max_retries,
                    stuck_timeout: config.stuck_timeout,
                },
            ],
        }
    }

    /// All stages in pipeline order.
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// The entry stage, queued when a lead is created.
    pub fn first(&self) -> Stage {
        self.stages[0].stage
    }

    /// Look up a stage's descriptor.
    pub fn descriptor(&self, stage: Stage) -> &StageDescriptor {
        self.stages
            .iter()
            .find(|d| d.stage == stage)
            .expect("stage graph covers every Stage variant")
    }

    /// The stage whose completion queues `stage`, if any.
    pub fn predecessor(&self, stage: Stage) -> Option<Stage> {
        self.stages
            .iter()
            .find(|d| d.next == Some(stage))
            .map(|d| d.stage)
    }
}
