//! Workflow flows: reviewer decisions over pending runs and the proposal
//! lifecycle state machine, end to end.

mod common;

use rust_decimal_macros::dec;
use std::sync::Arc;

use rebalancer::application::advisory::AdvisoryEngine;
use rebalancer::application::engine::RebalanceEngine;
use rebalancer::application::gate::evaluate_gate;
use rebalancer::application::idempotency::IdempotencyService;
use rebalancer::application::policy::PolicyResolver;
use rebalancer::application::proposal_lifecycle::{NewVersionInput, ProposalLifecycleService};
use rebalancer::application::simulation_service::{
    ArtifactMode, RequestContext, SimulateOutcome, SimulationService,
};
use rebalancer::application::workflow::WorkflowService;
use rebalancer::domain::model::gate::GateStatus;
use rebalancer::domain::model::proposal::ProposalState;
use rebalancer::domain::model::records::{WorkflowAction, WorkflowStatus};
use rebalancer::domain::model::rules::RunStatus;
use rebalancer::domain::ports::SupportabilityStore;
use rebalancer::infrastructure::persistence::memory_proposal_store::MemoryProposalStore;
use rebalancer::infrastructure::persistence::memory_store::MemoryStore;
use rebalancer::infrastructure::solver::default_solvers;

use common::cash_deployment_request;

async fn pending_run(store: Arc<dyn SupportabilityStore>) -> String {
    let service = SimulationService::new(
        RebalanceEngine::new(default_solvers()),
        AdvisoryEngine::new(),
        store,
        IdempotencyService::new(10, true),
        PolicyResolver::disabled(),
        ArtifactMode::Persisted,
    );
    // Tighten the cash band so the run lands in PENDING_REVIEW.
    let mut request = cash_deployment_request();
    request.options.cash_band_min_weight = Some(dec!(0.30));
    let ctx = RequestContext {
        correlation_id: "c_wf".to_string(),
        idempotency_key: Some("key-wf".to_string()),
        ..RequestContext::default()
    };
    let SimulateOutcome::Fresh(result) = service.simulate_rebalance(request, &ctx).await.unwrap()
    else {
        panic!("expected fresh result");
    };
    assert_eq!(result.status, RunStatus::PendingReview);
    result.run_id
}

#[tokio::test]
async fn test_review_cycle_over_pending_run() {
    let store: Arc<dyn SupportabilityStore> = Arc::new(MemoryStore::new());
    let run_id = pending_run(store.clone()).await;
    let workflow = WorkflowService::new(store, vec!["PENDING_REVIEW".to_string()]);

    assert_eq!(
        workflow.status_of(&run_id).await.unwrap(),
        WorkflowStatus::PendingReview
    );

    workflow
        .act(
            &run_id,
            WorkflowAction::RequestChanges,
            "CASH_BAND".to_string(),
            Some("raise the cash sleeve".to_string()),
            "risk_reviewer".to_string(),
            "c_act_1".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(
        workflow.status_of(&run_id).await.unwrap(),
        WorkflowStatus::PendingReview
    );

    workflow
        .act(
            &run_id,
            WorkflowAction::Approve,
            "REVIEWED_OK".to_string(),
            None,
            "senior_reviewer".to_string(),
            "c_act_2".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(
        workflow.status_of(&run_id).await.unwrap(),
        WorkflowStatus::Approved
    );

    let history = workflow.history(&run_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, WorkflowAction::RequestChanges);
    assert_eq!(history[1].action, WorkflowAction::Approve);
}

#[test]
fn test_gate_attached_when_enabled() {
    let engine = RebalanceEngine::new(default_solvers());
    let mut request = cash_deployment_request();
    request.options.enable_workflow_gates = true;
    let result = engine.simulate(&request, "run_g", "c_g", "sha256:g");

    let gate = result.gate_decision.expect("gate attached");
    // Clean run without consent on file routes to the client.
    assert_eq!(gate.gate, GateStatus::ClientConsentRequired);
    assert!(gate.requires_client_consent);

    let mut consented = cash_deployment_request();
    consented.options.enable_workflow_gates = true;
    consented.options.client_consent_already_obtained = true;
    let result = engine.simulate(&consented, "run_g2", "c_g2", "sha256:g2");
    assert_eq!(
        result.gate_decision.unwrap().gate,
        GateStatus::ExecutionReady
    );
}

#[test]
fn test_gate_is_pure_over_inputs() {
    let decision_a = evaluate_gate(
        RunStatus::Ready,
        &[],
        None,
        &Default::default(),
        &gated_options(),
    );
    let decision_b = evaluate_gate(
        RunStatus::Ready,
        &[],
        None,
        &Default::default(),
        &gated_options(),
    );
    assert_eq!(
        serde_json::to_value(&decision_a).unwrap(),
        serde_json::to_value(&decision_b).unwrap()
    );
}

fn gated_options() -> rebalancer::domain::model::options::EngineOptions {
    let mut options = rebalancer::domain::model::options::EngineOptions::default();
    options.enable_workflow_gates = true;
    options
}

fn version_input(portfolio_id: &str) -> NewVersionInput {
    NewVersionInput {
        portfolio_id: portfolio_id.to_string(),
        request_hash: "sha256:req".to_string(),
        artifact_hash: "sha256:art".to_string(),
        artifact_json: serde_json::json!({"result": {"status": "READY"}}),
        evidence_bundle_json: Some(serde_json::json!({"hashes": {}})),
        gate_decision_json: None,
        status_at_creation: "READY".to_string(),
        simulated: true,
    }
}

#[tokio::test]
async fn test_proposal_lifecycle_to_execution() {
    let service = ProposalLifecycleService::new(
        Arc::new(MemoryProposalStore::new()),
        false,
        false,
        true,
        true,
    );

    let (proposal, _) = service
        .create(version_input("pf_1"), "advisor".to_string())
        .await
        .unwrap();

    for (to_state, actor) in [
        (ProposalState::RiskReview, "advisor"),
        (ProposalState::ComplianceReview, "risk_officer"),
        (ProposalState::AwaitingClientConsent, "compliance_officer"),
        (ProposalState::ExecutionReady, "advisor"),
        (ProposalState::Executed, "operations"),
    ] {
        service
            .transition(
                &proposal.proposal_id,
                to_state,
                actor.to_string(),
                None,
                None,
            )
            .await
            .unwrap();
    }

    let final_state = service.load(&proposal.proposal_id).await.unwrap();
    assert_eq!(final_state.state, ProposalState::Executed);

    // Terminal: no further transitions.
    let err = service
        .transition(
            &proposal.proposal_id,
            ProposalState::Draft,
            "advisor".to_string(),
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        rebalancer::domain::errors::WorkflowError::InvalidTransition { .. }
    ));

    let events = service
        .store()
        .list_events(&proposal.proposal_id)
        .await
        .unwrap();
    // Creation plus five transitions.
    assert_eq!(events.len(), 6);
}

#[tokio::test]
async fn test_proposal_approvals_recorded_per_version() {
    let service = ProposalLifecycleService::new(
        Arc::new(MemoryProposalStore::new()),
        false,
        false,
        true,
        true,
    );
    let (proposal, _) = service
        .create(version_input("pf_1"), "advisor".to_string())
        .await
        .unwrap();
    service
        .approve(
            &proposal.proposal_id,
            "RISK".to_string(),
            "risk_officer".to_string(),
            Some("within appetite".to_string()),
        )
        .await
        .unwrap();

    let (_, version2) = service
        .add_version(&proposal.proposal_id, version_input("pf_1"), "advisor".to_string(), None)
        .await
        .unwrap();
    service
        .approve(
            &proposal.proposal_id,
            "RISK".to_string(),
            "risk_officer".to_string(),
            None,
        )
        .await
        .unwrap();

    let approvals = service
        .store()
        .list_approvals(&proposal.proposal_id)
        .await
        .unwrap();
    assert_eq!(approvals.len(), 2);
    assert_eq!(approvals[0].version_no, 1);
    assert_eq!(approvals[1].version_no, version2.version_no);
}
