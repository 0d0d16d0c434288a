//! Port abstractions for persistence and solving.
//!
//! The pipeline depends only on these traits; adapters live in
//! `infrastructure` and are selected at startup. Store methods return typed
//! `StoreError`s so callers can map outcomes without driver knowledge.

use async_trait::async_trait;

use crate::domain::errors::{EngineError, StoreError};
use crate::domain::model::proposal::{
    ApprovalRecord, Proposal, ProposalState, ProposalVersion, WorkflowEvent,
};
use crate::domain::model::records::{
    AsyncOperation, DecisionFilter, IdempotencyRecord, LineageEdge, OperationFilter, Page,
    RunFilter, RunRecord, SupportabilitySummary, WorkflowDecision,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence port for runs, idempotency, async operations, workflow
/// decisions, and lineage.
///
/// `save_run` is the single write that must be atomic: the run record, its
/// idempotency mapping (plus history row), and its lineage edges commit
/// together or not at all.
#[async_trait]
pub trait SupportabilityStore: Send + Sync {
    // Runs
    async fn save_run(
        &self,
        run: &RunRecord,
        idempotency: Option<&IdempotencyRecord>,
        lineage: &[LineageEdge],
    ) -> StoreResult<()>;
    async fn get_run(&self, run_id: &str) -> StoreResult<Option<RunRecord>>;
    async fn get_run_by_correlation(&self, correlation_id: &str) -> StoreResult<Option<RunRecord>>;
    async fn get_run_by_request_hash(&self, request_hash: &str)
    -> StoreResult<Option<RunRecord>>;
    async fn list_runs(
        &self,
        filter: &RunFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<RunRecord>>;

    // Artifacts
    async fn save_run_artifact(
        &self,
        run_id: &str,
        artifact: &serde_json::Value,
    ) -> StoreResult<()>;
    async fn get_run_artifact(&self, run_id: &str) -> StoreResult<Option<serde_json::Value>>;

    // Idempotency
    async fn get_idempotency_by_key(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>>;
    async fn list_idempotency_history(&self, key: &str) -> StoreResult<Vec<IdempotencyRecord>>;

    // Async operations
    async fn create_async_operation(&self, operation: &AsyncOperation) -> StoreResult<()>;
    async fn update_async_operation(&self, operation: &AsyncOperation) -> StoreResult<()>;
    async fn get_async_operation(&self, operation_id: &str) -> StoreResult<Option<AsyncOperation>>;
    async fn get_async_operation_by_correlation(
        &self,
        correlation_id: &str,
    ) -> StoreResult<Option<AsyncOperation>>;
    async fn list_async_operations(
        &self,
        filter: &OperationFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<AsyncOperation>>;
    async fn purge_expired_async_operations(&self, ttl_seconds: i64) -> StoreResult<u64>;

    // Workflow decisions
    async fn append_workflow_decision(&self, decision: &WorkflowDecision) -> StoreResult<()>;
    async fn list_workflow_decisions(
        &self,
        filter: &DecisionFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<WorkflowDecision>>;
    async fn list_workflow_decisions_by_run(
        &self,
        run_id: &str,
    ) -> StoreResult<Vec<WorkflowDecision>>;

    // Lineage
    async fn append_lineage_edge(&self, edge: &LineageEdge) -> StoreResult<()>;
    async fn list_lineage_edges(&self, entity_id: &str) -> StoreResult<Vec<LineageEdge>>;

    // Summary & retention
    async fn supportability_summary(&self) -> StoreResult<SupportabilitySummary>;
    /// Purge runs older than the retention window, cascading to artifacts,
    /// idempotency rows, workflow decisions, and lineage edges keyed to the
    /// purged runs. Returns the number of runs removed.
    async fn purge_expired_runs(&self, retention_days: i64) -> StoreResult<u64>;

    /// Backend readiness probe for health reporting.
    async fn ready(&self) -> StoreResult<()>;
}

/// Persistence port for the proposal lifecycle aggregate.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    async fn create_proposal(
        &self,
        proposal: &Proposal,
        version: &ProposalVersion,
        event: &WorkflowEvent,
    ) -> StoreResult<()>;
    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<Proposal>>;
    async fn list_proposals(
        &self,
        portfolio_id: Option<&str>,
        state: Option<ProposalState>,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<Proposal>>;
    async fn get_version(
        &self,
        proposal_id: &str,
        version_no: i32,
    ) -> StoreResult<Option<ProposalVersion>>;
    /// Append a new immutable version and advance the aggregate head.
    async fn append_version(
        &self,
        proposal: &Proposal,
        version: &ProposalVersion,
        event: &WorkflowEvent,
    ) -> StoreResult<()>;
    /// Persist a state transition with its event, atomically.
    async fn transition(&self, proposal: &Proposal, event: &WorkflowEvent) -> StoreResult<()>;
    async fn append_approval(&self, approval: &ApprovalRecord) -> StoreResult<()>;
    async fn list_events(&self, proposal_id: &str) -> StoreResult<Vec<WorkflowEvent>>;
    async fn list_approvals(&self, proposal_id: &str) -> StoreResult<Vec<ApprovalRecord>>;
    async fn ready(&self) -> StoreResult<()>;
}

/// One group cap expressed over target-vector indices.
#[derive(Debug, Clone)]
pub struct GroupBound {
    pub key: String,
    pub indices: Vec<usize>,
    pub max_weight: f64,
}

/// Minimize `||w - target||^2` subject to box bounds, group caps, and a
/// budget band on `sum(w)`.
///
/// Weights enter and leave as `f64`; the decimal boundary is owned by the
/// caller, which re-normalizes the solution.
#[derive(Debug, Clone)]
pub struct QuadraticProblem {
    pub target: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub groups: Vec<GroupBound>,
    /// `budget_min <= sum(w) <= budget_max` (the cash band, inverted).
    pub budget_min: f64,
    pub budget_max: f64,
}

#[derive(Debug, Clone)]
pub enum SolveOutcome {
    Solved { weights: Vec<f64> },
    /// Solver-reported infeasibility, e.g. `PRIMAL_INFEASIBLE`.
    Infeasible { status: String },
}

/// Capability set for target-generation backends. Implementations must be
/// deterministic for a given problem.
pub trait QuadraticSolver: Send + Sync {
    fn name(&self) -> &'static str;
    fn minimize_distance(&self, problem: &QuadraticProblem) -> Result<SolveOutcome, EngineError>;
}
