use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a compliance rule. HARD failures block the run, SOFT
/// failures route it to review, INFO never affects status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleSeverity {
    Hard,
    Soft,
    Info,
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleSeverity::Hard => "HARD",
            RuleSeverity::Soft => "SOFT",
            RuleSeverity::Info => "INFO",
        };
        write!(f, "{s}")
    }
}

pub mod rule_id {
    pub const CASH_BAND: &str = "CASH_BAND";
    pub const SINGLE_POSITION_MAX: &str = "SINGLE_POSITION_MAX";
    pub const DATA_QUALITY: &str = "DATA_QUALITY";
    pub const MIN_TRADE_SIZE: &str = "MIN_TRADE_SIZE";
    pub const NO_SHORTING: &str = "NO_SHORTING";
    pub const INSUFFICIENT_CASH: &str = "INSUFFICIENT_CASH";
    pub const RECONCILIATION: &str = "RECONCILIATION";
}

/// Outcome of one rule evaluation against the simulated after-state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub severity: RuleSeverity,
    pub passed: bool,
    pub message: String,
    #[serde(default)]
    pub reason_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RuleResult {
    pub fn pass(rule_id: &str, severity: RuleSeverity, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            passed: true,
            message: message.into(),
            reason_codes: vec![],
            details: None,
        }
    }

    pub fn fail(
        rule_id: &str,
        severity: RuleSeverity,
        message: impl Into<String>,
        reason_codes: Vec<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            passed: false,
            message: message.into(),
            reason_codes,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Ready,
    PendingReview,
    Blocked,
}

impl RunStatus {
    /// Any HARD fail blocks; any SOFT fail routes to review; else ready.
    pub fn derive(rules: &[RuleResult]) -> Self {
        let hard_fail = rules
            .iter()
            .any(|r| !r.passed && r.severity == RuleSeverity::Hard);
        if hard_fail {
            return RunStatus::Blocked;
        }
        let soft_fail = rules
            .iter()
            .any(|r| !r.passed && r.severity == RuleSeverity::Soft);
        if soft_fail {
            RunStatus::PendingReview
        } else {
            RunStatus::Ready
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Ready => "READY",
            RunStatus::PendingReview => "PENDING_REVIEW",
            RunStatus::Blocked => "BLOCKED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(RunStatus::Ready),
            "PENDING_REVIEW" => Ok(RunStatus::PendingReview),
            "BLOCKED" => Ok(RunStatus::Blocked),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}
