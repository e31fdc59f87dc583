//! Task-failure classification into hold reasons.
//!
//! A failing task pauses only itself (or its goal) with a typed reason and a
//! review time; it never fails the whole goal. Classification is by error
//! text, since tool and orchestrator errors arrive as free-form strings.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// HoldKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldKind {
    /// Waiting on an external system (timeout, connection refused).
    ExternalWait,
    /// Waiting on data that doesn't exist yet (not found, empty result).
    DataWait,
    /// Backing off a rate limit.
    RateLimited,
    /// Waiting on a human (permission, auth).
    ApprovalWait,
}

impl HoldKind {
    /// How long to wait before the hold is reviewed.
    pub fn review_delay(&self) -> Duration {
        match self {
            HoldKind::ExternalWait => Duration::minutes(30),
            HoldKind::DataWait => Duration::hours(1),
            HoldKind::RateLimited => Duration::minutes(15),
            HoldKind::ApprovalWait => Duration::hours(24),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HoldKind::ExternalWait => "external_wait",
            HoldKind::DataWait => "data_wait",
            HoldKind::RateLimited => "rate_limited",
            HoldKind::ApprovalWait => "approval_wait",
        }
    }
}

impl std::fmt::Display for HoldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HoldReason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldReason {
    pub kind: HoldKind,
    pub detail: String,
    pub review_at: DateTime<Utc>,
}

impl HoldReason {
    pub fn new(kind: HoldKind, detail: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            review_at: now + kind.review_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a task-level error into a hold reason.
///
/// Matching is case-insensitive substring search. Order matters: rate limits
/// often mention "connection" in the same message, so they are checked first.
pub fn classify_failure(error: &str, now: DateTime<Utc>) -> HoldReason {
    let lower = error.to_lowercase();

    let kind = if contains_any(&lower, &["rate limit", "too many requests", "429"]) {
        HoldKind::RateLimited
    } else if contains_any(
        &lower,
        &["permission", "unauthorized", "forbidden", "auth", "401", "403"],
    ) {
        HoldKind::ApprovalWait
    } else if contains_any(&lower, &["not found", "no such", "empty", "missing"]) {
        HoldKind::DataWait
    } else {
        // timeout / connection / anything else unknown: wait on the external side
        HoldKind::ExternalWait
    };

    HoldReason::new(kind, error, now)
}

/// Recognize an orchestrator billing/credit failure. These trigger a pause
/// with automatic resumption, never goal abandonment.
pub fn is_billing_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    contains_any(
        &lower,
        &["billing", "insufficient credit", "credit balance", "payment required", "402"],
    )
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_external_wait_30m() {
        let now = Utc::now();
        let reason = classify_failure("request timeout after 30s", now);
        assert_eq!(reason.kind, HoldKind::ExternalWait);
        assert_eq!(reason.review_at, now + Duration::minutes(30));
    }

    #[test]
    fn connection_error_is_external_wait() {
        let reason = classify_failure("connection refused by upstream", Utc::now());
        assert_eq!(reason.kind, HoldKind::ExternalWait);
    }

    #[test]
    fn not_found_is_data_wait_1h() {
        let now = Utc::now();
        let reason = classify_failure("record not found", now);
        assert_eq!(reason.kind, HoldKind::DataWait);
        assert_eq!(reason.review_at, now + Duration::hours(1));
    }

    #[test]
    fn rate_limit_is_15m_even_with_connection_text() {
        let now = Utc::now();
        let reason = classify_failure("rate limit exceeded on connection", now);
        assert_eq!(reason.kind, HoldKind::RateLimited);
        assert_eq!(reason.review_at, now + Duration::minutes(15));
    }

    #[test]
    fn auth_is_approval_wait_24h() {
        let now = Utc::now();
        let reason = classify_failure("401 Unauthorized", now);
        assert_eq!(reason.kind, HoldKind::ApprovalWait);
        assert_eq!(reason.review_at, now + Duration::hours(24));
    }

    #[test]
    fn billing_errors_are_recognized() {
        assert!(is_billing_error("Billing hard limit reached"));
        assert!(is_billing_error("insufficient credit balance"));
        assert!(!is_billing_error("connection timeout"));
    }
}
