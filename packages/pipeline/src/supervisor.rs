//! Explicit supervision of the pipeline's long-running loops.
//!
//! Each worker loop implements [`Service`]; the [`Supervisor`] owns one
//! handle per running loop and a shared shutdown token. Start and stop
//! are idempotent, and there is no global registry of "is this running"
//! state anywhere else.

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A long-running background loop.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run until `shutdown` is cancelled.
    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()>;
}

/// Holds one handle per running service loop.
pub struct Supervisor {
    shutdown: CancellationToken,
    pending: Vec<Box<dyn Service>>,
    running: Vec<(&'static str, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            pending: Vec::new(),
            running: Vec::new(),
        }
    }

    /// Register a service. Takes effect at the next `start` call.
    pub fn add(&mut self, service: Box<dyn Service>) {
        self.pending.push(service);
    }

    /// Spawn every registered-but-not-yet-running service. Calling this
    /// again without new registrations is a no-op.
    pub fn start(&mut self) {
        for service in self.pending.drain(..) {
            let name = service.name();
            let token = self.shutdown.child_token();
            let handle = tokio::spawn(async move {
                if let Err(e) = service.run(token).await {
                    error!(service = name, error = %e, "service exited with error");
                }
            });
            info!(service = name, "service started");
            self.running.push((name, handle));
        }
    }

    /// Cancel all running services and wait for them to finish. Safe to
    /// call more than once.
    pub async fn stop(&mut self) {
        if self.running.is_empty() {
            return;
        }

        self.shutdown.cancel();
        for (name, handle) in self.running.drain(..) {
            if let Err(e) = handle.await {
                error!(service = name, error = %e, "service task panicked");
            } else {
                info!(service = name, "service stopped");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_empty()
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
