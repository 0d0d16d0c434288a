use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::model::gate::ReasonSeverity;

/// Lifecycle of a suitability issue across the before/after states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    New,
    Persistent,
    Resolved,
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueStatus::New => "NEW",
            IssueStatus::Persistent => "PERSISTENT",
            IssueStatus::Resolved => "RESOLVED",
        };
        write!(f, "{s}")
    }
}

pub mod dimension {
    pub const SINGLE_POSITION: &str = "SINGLE_POSITION";
    pub const ISSUER_CONCENTRATION: &str = "ISSUER_CONCENTRATION";
    pub const LIQUIDITY_TIER: &str = "LIQUIDITY_TIER";
    pub const GOVERNANCE: &str = "GOVERNANCE";
    pub const CASH_BAND: &str = "CASH_BAND";
    pub const DATA_QUALITY: &str = "DATA_QUALITY";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuitabilityIssue {
    /// Deterministic key: `<dimension>:<entity>`.
    pub issue_key: String,
    pub dimension: String,
    pub entity: String,
    pub status: IssueStatus,
    pub severity: ReasonSeverity,
    pub message: String,
}

impl SuitabilityIssue {
    pub fn key(dimension: &str, entity: &str) -> String {
        format!("{dimension}:{entity}")
    }
}

/// Gate recommendation derived from the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedGate {
    ComplianceReview,
    RiskReview,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuitabilityReport {
    /// Sorted by status (NEW, PERSISTENT, RESOLVED), severity (HIGH..LOW),
    /// dimension, issue key.
    pub issues: Vec<SuitabilityIssue>,
    pub recommended_gate: RecommendedGate,
}

impl SuitabilityReport {
    pub fn sort_issues(issues: &mut [SuitabilityIssue]) {
        issues.sort_by(|a, b| {
            a.status
                .cmp(&b.status)
                .then_with(|| a.severity.cmp(&b.severity))
                .then_with(|| a.dimension.cmp(&b.dimension))
                .then_with(|| a.issue_key.cmp(&b.issue_key))
        });
    }

    pub fn has_new_at(&self, severity: ReasonSeverity) -> bool {
        self.issues
            .iter()
            .any(|i| i.status == IssueStatus::New && i.severity == severity)
    }
}
