use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of an advisory proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalState {
    Draft,
    RiskReview,
    ComplianceReview,
    AwaitingClientConsent,
    ExecutionReady,
    Executed,
    Rejected,
    Cancelled,
    Expired,
}

impl ProposalState {
    /// Static transition table. Terminal states allow nothing.
    pub fn allowed_transitions(&self) -> &'static [ProposalState] {
        use ProposalState::*;
        match self {
            Draft => &[RiskReview, ComplianceReview, Cancelled, Expired],
            RiskReview => &[
                ComplianceReview,
                AwaitingClientConsent,
                ExecutionReady,
                Draft,
                Rejected,
                Cancelled,
                Expired,
            ],
            ComplianceReview => &[
                AwaitingClientConsent,
                ExecutionReady,
                Draft,
                Rejected,
                Cancelled,
                Expired,
            ],
            AwaitingClientConsent => &[ExecutionReady, Draft, Rejected, Cancelled, Expired],
            ExecutionReady => &[Executed, Cancelled, Expired],
            Executed | Rejected | Cancelled | Expired => &[],
        }
    }

    pub fn can_transition_to(&self, next: ProposalState) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalState::Draft => "DRAFT",
            ProposalState::RiskReview => "RISK_REVIEW",
            ProposalState::ComplianceReview => "COMPLIANCE_REVIEW",
            ProposalState::AwaitingClientConsent => "AWAITING_CLIENT_CONSENT",
            ProposalState::ExecutionReady => "EXECUTION_READY",
            ProposalState::Executed => "EXECUTED",
            ProposalState::Rejected => "REJECTED",
            ProposalState::Cancelled => "CANCELLED",
            ProposalState::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

/// The proposal aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    pub portfolio_id: String,
    pub state: ProposalState,
    pub version_no: i32,
    pub created_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
}

/// An immutable snapshot of the proposal content at a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalVersion {
    pub proposal_id: String,
    pub version_no: i32,
    pub request_hash: String,
    pub artifact_hash: String,
    pub artifact_json: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_bundle_json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_decision_json: Option<serde_json::Value>,
    pub status_at_creation: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only event log entry for a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_id: String,
    pub proposal_id: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state: Option<ProposalState>,
    pub to_state: ProposalState,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A recorded approval on a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approval_id: String,
    pub proposal_id: String,
    pub version_no: i32,
    pub role: String,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub approved_at: DateTime<Utc>,
}
