use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted record of one engine run. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub rebalance_run_id: String,
    pub correlation_id: String,
    pub request_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub portfolio_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub result_json: serde_json::Value,
}

/// Current idempotency mapping for a key; history rows use the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub idempotency_key: String,
    pub request_hash: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Succeeded | OperationStatus::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Running => "RUNNING",
            OperationStatus::Succeeded => "SUCCEEDED",
            OperationStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OperationStatus::Pending),
            "RUNNING" => Ok(OperationStatus::Running),
            "SUCCEEDED" => Ok(OperationStatus::Succeeded),
            "FAILED" => Ok(OperationStatus::Failed),
            other => Err(format!("unknown operation status: {other}")),
        }
    }
}

/// An asynchronous submission and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncOperation {
    pub operation_id: String,
    pub operation_type: String,
    pub status: OperationStatus,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_json: Option<serde_json::Value>,
    pub request_json: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAction {
    Approve,
    Reject,
    RequestChanges,
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowAction::Approve => "APPROVE",
            WorkflowAction::Reject => "REJECT",
            WorkflowAction::RequestChanges => "REQUEST_CHANGES",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    NotRequired,
    PendingReview,
    Approved,
    Rejected,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::NotRequired => "NOT_REQUIRED",
            WorkflowStatus::PendingReview => "PENDING_REVIEW",
            WorkflowStatus::Approved => "APPROVED",
            WorkflowStatus::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// A reviewer decision on a run. Append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDecision {
    pub decision_id: String,
    pub run_id: String,
    pub action: WorkflowAction,
    pub reason_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub actor_id: String,
    pub decided_at: DateTime<Utc>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineageEdgeType {
    CorrelationToRun,
    IdempotencyToRun,
    OperationToCorrelation,
}

impl fmt::Display for LineageEdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LineageEdgeType::CorrelationToRun => "CORRELATION_TO_RUN",
            LineageEdgeType::IdempotencyToRun => "IDEMPOTENCY_TO_RUN",
            LineageEdgeType::OperationToCorrelation => "OPERATION_TO_CORRELATION",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source_entity_id: String,
    pub edge_type: LineageEdgeType,
    pub target_entity_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Filters for run listings; all optional, combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub portfolio_id: Option<String>,
    pub request_hash: Option<String>,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub operation_type: Option<String>,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub reason_code: Option<String>,
    pub correlation_id: Option<String>,
}

/// Counts and status distributions across supportability records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportabilitySummary {
    pub total_runs: i64,
    pub runs_by_status: std::collections::BTreeMap<String, i64>,
    pub total_operations: i64,
    pub operations_by_status: std::collections::BTreeMap<String, i64>,
    pub total_idempotency_keys: i64,
    pub total_workflow_decisions: i64,
    pub total_lineage_edges: i64,
}

/// Denormalized read view combining everything known about one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportBundle {
    pub run: RunRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<serde_json::Value>,
    pub workflow_status: WorkflowStatus,
    pub workflow_decisions: Vec<WorkflowDecision>,
    pub lineage_edges: Vec<LineageEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_terminality() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Running.is_terminal());
        assert!(OperationStatus::Succeeded.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_edge_type_display() {
        assert_eq!(
            LineageEdgeType::OperationToCorrelation.to_string(),
            "OPERATION_TO_CORRELATION"
        );
    }
}
