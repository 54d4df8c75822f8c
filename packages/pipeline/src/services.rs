//! Seam between the pipeline engine and external services.
//!
//! Every stage delegates its actual work to a [`StageService`]: submit a
//! job, later ask for its status. Failures surface as error messages the
//! classifier can pattern-match.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Lead;

/// Which external service handles a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Scraper,
    LlmBatch,
}

/// Status of an external job as reported by its service.
#[derive(Debug, Clone)]
pub enum ServiceJobStatus {
    /// Accepted but not yet running
    Pending,
    /// Running
    Processing,
    /// Finished successfully
    Completed { result: serde_json::Value },
    /// Finished unsuccessfully
    Failed { error: String },
}

/// Adapter for one external service.
#[async_trait]
pub trait StageService: Send + Sync {
    /// Submit work for a lead. `prior_result` carries the previous stage's
    /// output for stages that build on it.
    ///
    /// Returns the service's opaque job identifier. Errors carry a message
    /// string suitable for [`crate::classify::classify`].
    async fn submit(
        &self,
        lead: &Lead,
        prior_result: Option<&serde_json::Value>,
    ) -> Result<String>;

    /// Query the status of a previously submitted job.
    ///
    /// A transport-level error here is an infrastructure problem, not a
    /// job failure; callers must not mutate lead state because of it.
    async fn status(&self, job_id: &str) -> Result<ServiceJobStatus>;
}

/// Immutable lookup table from [`ServiceKind`] to its adapter.
pub struct ServiceRegistry {
    services: HashMap<ServiceKind, Arc<dyn StageService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    pub fn register(mut self, kind: ServiceKind, service: Arc<dyn StageService>) -> Self {
        self.services.insert(kind, service);
        self
    }

    pub fn get(&self, kind: ServiceKind) -> Result<Arc<dyn StageService>> {
        self.services
            .get(&kind)
            .cloned()
            .ok_or_else(|| anyhow!("no service registered for {:?}", kind))
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
