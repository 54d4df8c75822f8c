//! Inbound completion webhook.
//!
//! External services push job completions here instead of waiting for the
//! poller to notice them. Processing order is fixed: authenticate the raw
//! body, log it by fingerprint, then hand off to the pipeline's shared
//! resolution path. Failures after authentication return 5xx so the
//! sender's retry mechanism redelivers - the fingerprint log makes that
//! redelivery safe.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::{error, warn};

use pipeline::{process_notice, CompletionNotice, WebhookDisposition};

use crate::app::AppState;

const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// `POST /job-complete`
pub async fn job_complete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    // Authenticate before anything touches the database. With no secret
    // configured, unsigned payloads are accepted (development mode).
    if let Some(secret) = &state.webhook_secret {
        if !verify_signature(&headers, &body, secret) {
            warn!("webhook rejected: signature mismatch");
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "invalid signature" })),
            );
        }
    }

    let notice: CompletionNotice = match serde_json::from_slice(&body) {
        Ok(notice) => notice,
        Err(e) => {
            warn!(error = %e, "webhook rejected: malformed payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("malformed payload: {e}") })),
            );
        }
    };

    match process_notice(state.store.as_ref(), &state.graph, &body, &notice).await {
        Ok(WebhookDisposition::Processed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "processed" })),
        ),
        Ok(WebhookDisposition::AlreadyProcessed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "already_processed" })),
        ),
        Ok(WebhookDisposition::UnknownTarget) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "unknown lead or stage" })),
        ),
        Err(e) => {
            error!(error = %e, "webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "processing failed" })),
            )
        }
    }
}

/// Verify `X-Webhook-Signature: sha256=<hex(hmac_sha256(secret, body))>`.
fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(hex_sig) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(hex_sig.as_bytes(), expected.as_bytes())
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Compute the signature header value for a payload. Used by tests and
/// any in-process sender.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_signature(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn valid_signature_accepted() {
        let body = br#"{"job_id":"j1"}"#;
        let sig = sign_payload("topsecret", body);
        assert!(verify_signature(&headers_with_signature(&sig), body, "topsecret"));
    }

    #[test]
    fn wrong_secret_rejected() {
        let body = br#"{"job_id":"j1"}"#;
        let sig = sign_payload("other-secret", body);
        assert!(!verify_signature(&headers_with_signature(&sig), body, "topsecret"));
    }

    #[test]
    fn tampered_body_rejected() {
        let sig = sign_payload("topsecret", br#"{"job_id":"j1"}"#);
        assert!(!verify_signature(
            &headers_with_signature(&sig),
            br#"{"job_id":"j2"}"#,
            "topsecret"
        ));
    }

    #[test]
    fn missing_header_rejected() {
        assert!(!verify_signature(&HeaderMap::new(), b"{}", "topsecret"));
    }

    #[test]
    fn missing_prefix_rejected() {
        let body = b"{}";
        let raw = sign_payload("topsecret", body).replace("sha256=", "");
        assert!(!verify_signature(&headers_with_signature(&raw), body, "topsecret"));
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
