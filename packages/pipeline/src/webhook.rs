//! Webhook completion detector: payload model, fingerprinting, and
//! idempotent processing.
//!
//! External services deliver completion pushes at least once. Every
//! delivery is appended to the webhook log keyed by a fingerprint of the
//! raw body before any lead state is touched, so a redelivered payload is
//! recognized no matter where the previous attempt died.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::config::StageGraph;
use crate::resolver::{resolve, JobOutcome, Resolution};
use crate::store::LeadStore;
use crate::types::Stage;

/// Body of a `POST /job-complete` push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub job_id: String,
    pub stage: Stage,
    pub lead_id: Uuid,
    pub status: NoticeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeStatus {
    Completed,
    Failed,
}

/// How a delivery was handled, for the HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    Processed,
    AlreadyProcessed,
    /// The notice names a lead/stage row that does not exist
    UnknownTarget,
}

/// Deterministic content fingerprint of a raw payload, used to detect
/// duplicate deliveries.
pub fn fingerprint(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

/// Process an authenticated completion notice.
///
/// Order matters: the payload is logged first (duplicate fingerprints are
/// a no-op, not an error), then the shared resolver applies the
/// idempotency check and the success/failure policy, then the log entry
/// is marked processed. Any error after logging leaves the entry
/// unprocessed so the sender's retry can finish the job safely.
pub async fn process_notice(
    store: &dyn LeadStore,
    graph: &StageGraph,
    raw_body: &[u8],
    notice: &CompletionNotice,
) -> Result<WebhookDisposition> {
    let payload: serde_json::Value = serde_json::from_slice(raw_body)?;
    let print = fingerprint(raw_body);

    let Some(event) = store.insert_webhook_event(&print, &payload).await? else {
        debug!(fingerprint = %print, "duplicate webhook delivery");
        return Ok(WebhookDisposition::AlreadyProcessed);
    };

    let outcome = match notice.status {
        NoticeStatus::Completed => JobOutcome::Completed {
            result: notice.result.clone().unwrap_or(serde_json::Value::Null),
        },
        NoticeStatus::Failed => JobOutcome::Failed {
            error: notice
                .error
                .clone()
                .unwrap_or_else(|| "job failed".to_string()),
        },
    };

    let resolution = resolve(
        store,
        graph,
        notice.lead_id,
        notice.stage,
        &notice.job_id,
        outcome,
    )
    .await?;

    store.mark_webhook_processed(event.id).await?;

    Ok(match resolution {
        Resolution::NotFound => WebhookDisposition::UnknownTarget,
        Resolution::AlreadyProcessed => WebhookDisposition::AlreadyProcessed,
        Resolution::Completed | Resolution::Failed | Resolution::Requeued => {
            WebhookDisposition::Processed
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let body = br#"{"job_id":"j1","status":"completed"}"#;
        assert_eq!(fingerprint(body), fingerprint(body));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let print = fingerprint(b"payload");
        assert_eq!(print.len(), 64);
        assert!(print.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_payloads_different_fingerprints() {
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
    }

    #[test]
    fn notice_deserializes_completed_payload() {
        let body = r#"{
            "job_id": "run-1",
            "stage": "scrape",
            "lead_id": "0195a8e2-7f43-7e70-b1a2-3a9b8f1c2d3e",
            "status": "completed",
            "result": {"pages": 3},
            "timestamp": "2025-03-01T12:00:00Z"
        }"#;
        let notice: CompletionNotice = serde_json::from_str(body).unwrap();
        assert_eq!(notice.stage, Stage::Scrape);
        assert_eq!(notice.status, NoticeStatus::Completed);
        assert!(notice.result.is_some());
        assert!(notice.error.is_none());
    }

    #[test]
    fn notice_rejects_unknown_stage() {
        let body = r#"{
            "job_id": "run-1",
            "stage": "transmogrify",
            "lead_id": "0195a8e2-7f43-7e70-b1a2-3a9b8f1c2d3e",
            "status": "completed"
        }"#;
        assert!(serde_json::from_str::<CompletionNotice>(body).is_err());
    }
}
