//! Test doubles for the service seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::services::{ServiceJobStatus, StageService};
use crate::types::Lead;

/// Scriptable in-memory stage service.
///
/// Submissions hand out sequential job ids (`mock-job-1`, `mock-job-2`,
/// ...). Status answers default to `Processing` until a test scripts a
/// terminal one with [`set_status`](MockStageService::set_status).
pub struct MockStageService {
    counter: AtomicUsize,
    submitted: Mutex<Vec<(Uuid, Option<serde_json::Value>)>>,
    statuses: Mutex<HashMap<String, ServiceJobStatus>>,
    submit_error: Mutex<Option<String>>,
    status_error: Mutex<Option<String>>,
}

impl MockStageService {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            submit_error: Mutex::new(None),
            status_error: Mutex::new(None),
        }
    }

    /// Script the answer for a job id.
    pub fn set_status(&self, job_id: &str, status: ServiceJobStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), status);
    }

    /// Make every subsequent submit fail with `message`.
    pub fn fail_submissions_with(&self, message: &str) {
        *self.submit_error.lock().unwrap() = Some(message.to_string());
    }

    /// Make every subsequent status query fail (transport error).
    pub fn fail_status_queries_with(&self, message: &str) {
        *self.status_error.lock().unwrap() = Some(message.to_string());
    }

    /// Leads submitted so far, with the prior-stage result each carried.
    pub fn submissions(&self) -> Vec<(Uuid, Option<serde_json::Value>)> {
        self.submitted.lock().unwrap().clone()
    }

    /// The job id handed out for the `n`-th submission (zero-based).
    pub fn job_id(&self, n: usize) -> String {
        format!("mock-job-{}", n + 1)
    }
}

impl Default for MockStageService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageService for MockStageService {
    async fn submit(
        &self,
        lead: &Lead,
        prior_result: Option<&serde_json::Value>,
    ) -> Result<String> {
        if let Some(message) = self.submit_error.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.submitted
            .lock()
            .unwrap()
            .push((lead.id, prior_result.cloned()));
        Ok(format!("mock-job-{n}"))
    }

    async fn status(&self, job_id: &str) -> Result<ServiceJobStatus> {
        if let Some(message) = self.status_error.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }

        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or(ServiceJobStatus::Processing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lead;

    #[tokio::test]
    async fn hands_out_sequential_job_ids() {
        let service = MockStageService::new();
        let lead = Lead::new(None, "https://example.com".into());

        let first = service.submit(&lead, None).await.unwrap();
        let second = service.submit(&lead, None).await.unwrap();

        assert_eq!(first, "mock-job-1");
        assert_eq!(second, "mock-job-2");
        assert_eq!(service.submissions().len(), 2);
    }

    #[tokio::test]
    async fn unscripted_status_is_processing() {
        let service = MockStageService::new();
        assert!(matches!(
            service.status("anything").await.unwrap(),
            ServiceJobStatus::Processing
        ));
    }

    #[tokio::test]
    async fn scripted_failures_surface() {
        let service = MockStageService::new();
        service.fail_submissions_with("HTTP 429 Too Many Requests");

        let lead = Lead::new(None, "https://example.com".into());
        let err = service.submit(&lead, None).await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
