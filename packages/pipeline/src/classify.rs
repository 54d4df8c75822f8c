//! Failure classification for external-service errors.
//!
//! A pure mapping from an error message to a retry decision. The policy
//! favors retrying over silently dropping work: anything we cannot
//! recognize is treated as retriable.

use serde::{Deserialize, Serialize};

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Permanent error - terminates the stage regardless of retry budget
    Hard,
    /// Transient error - consumes one retry if budget remains
    Retriable,
    /// Unrecognized error - handled like Retriable
    Unknown,
}

impl FailureKind {
    /// Whether this failure kind should trigger a retry.
    pub fn should_retry(&self) -> bool {
        matches!(self, FailureKind::Retriable | FailureKind::Unknown)
    }
}

/// Patterns that terminate a stage immediately: the request will never
/// succeed no matter how often it is retried.
const HARD_PATTERNS: &[&str] = &[
    "enotfound",
    "dns error",
    "failed to resolve",
    "name or service not known",
    "econnrefused",
    "connection refused",
    "401",
    "unauthorized",
    "403",
    "forbidden",
    "404",
    "not found",
    "no content extracted",
    "malformed",
    "invalid input",
];

/// Patterns worth another attempt.
const RETRIABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "timed-out",
    "429",
    "too many requests",
    "rate limit",
    "500",
    "502",
    "503",
    "504",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "out of memory",
    "oom",
    "worker crashed",
    "econnreset",
    "connection reset",
];

/// Classify an error message.
///
/// Same input always yields same output; hard patterns win over
/// retriable ones so "404 after 3 timeouts" still terminates.
pub fn classify(message: &str) -> FailureKind {
    let msg = message.to_lowercase();

    if HARD_PATTERNS.iter().any(|p| msg.contains(p)) {
        return FailureKind::Hard;
    }
    if RETRIABLE_PATTERNS.iter().any(|p| msg.contains(p)) {
        return FailureKind::Retriable;
    }
    FailureKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_failure_is_hard() {
        assert_eq!(classify("ENOTFOUND api.example.com"), FailureKind::Hard);
        assert_eq!(
            classify("dns error: failed to lookup address"),
            FailureKind::Hard
        );
    }

    #[test]
    fn connection_refused_is_hard() {
        assert_eq!(classify("connect ECONNREFUSED 10.0.0.1:443"), FailureKind::Hard);
    }

    #[test]
    fn auth_and_missing_are_hard() {
        assert_eq!(classify("HTTP 401 Unauthorized"), FailureKind::Hard);
        assert_eq!(classify("HTTP 403 Forbidden"), FailureKind::Hard);
        assert_eq!(classify("HTTP 404 Not Found"), FailureKind::Hard);
    }

    #[test]
    fn empty_extraction_is_hard() {
        assert_eq!(classify("no content extracted from page"), FailureKind::Hard);
    }

    #[test]
    fn rate_limit_is_retriable() {
        assert_eq!(
            classify("HTTP 429 Too Many Requests"),
            FailureKind::Retriable
        );
    }

    #[test]
    fn server_errors_are_retriable() {
        assert_eq!(classify("HTTP 500 Internal Server Error"), FailureKind::Retriable);
        assert_eq!(classify("HTTP 503 Service Unavailable"), FailureKind::Retriable);
        assert_eq!(classify("upstream timed out"), FailureKind::Retriable);
        assert_eq!(classify("worker crashed with out of memory"), FailureKind::Retriable);
    }

    #[test]
    fn unseen_error_is_unknown_but_retries() {
        let kind = classify("some never-seen error");
        assert_eq!(kind, FailureKind::Unknown);
        assert!(kind.should_retry());
    }

    #[test]
    fn hard_does_not_retry() {
        assert!(!FailureKind::Hard.should_retry());
        assert!(FailureKind::Retriable.should_retry());
    }

    #[test]
    fn classification_is_deterministic() {
        let msg = "request timeout after 30s";
        assert_eq!(classify(msg), classify(msg));
    }

    #[test]
    fn hard_wins_over_retriable() {
        // A 404 on a retried request is still permanent.
        assert_eq!(classify("HTTP 404 after timeout"), FailureKind::Hard);
    }
}
