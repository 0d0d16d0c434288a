use serde::{Deserialize, Serialize};
use std::fmt;

/// Next-step routing attached to a run when workflow gates are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateStatus {
    Blocked,
    ComplianceReviewRequired,
    RiskReviewRequired,
    ClientConsentRequired,
    ExecutionReady,
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateStatus::Blocked => "BLOCKED",
            GateStatus::ComplianceReviewRequired => "COMPLIANCE_REVIEW_REQUIRED",
            GateStatus::RiskReviewRequired => "RISK_REVIEW_REQUIRED",
            GateStatus::ClientConsentRequired => "CLIENT_CONSENT_REQUIRED",
            GateStatus::ExecutionReady => "EXECUTION_READY",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateNextStep {
    FixInput,
    ComplianceReview,
    RiskReview,
    ObtainClientConsent,
    Execute,
}

/// Severity attached to a gate reason, highest first in output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReason {
    pub severity: ReasonSeverity,
    /// Where the reason came from: `RULE`, `SUITABILITY`, `DIAGNOSTIC`.
    pub source: String,
    pub reason_code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub gate: GateStatus,
    pub next_step: GateNextStep,
    /// Sorted by severity, then source, then reason code.
    pub reasons: Vec<GateReason>,
    pub requires_client_consent: bool,
}

impl GateDecision {
    pub fn sort_reasons(reasons: &mut [GateReason]) {
        reasons.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.reason_code.cmp(&b.reason_code))
        });
    }
}
