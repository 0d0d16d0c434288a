//! Proposal lifecycle: gated state machine over immutable versions with an
//! append-only event log and optimistic concurrency on transitions.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::WorkflowError;
use crate::domain::model::proposal::{
    ApprovalRecord, Proposal, ProposalState, ProposalVersion, WorkflowEvent,
};
use crate::domain::ports::ProposalStore;

pub struct NewVersionInput {
    pub portfolio_id: String,
    pub request_hash: String,
    pub artifact_hash: String,
    pub artifact_json: serde_json::Value,
    pub evidence_bundle_json: Option<serde_json::Value>,
    pub gate_decision_json: Option<serde_json::Value>,
    pub status_at_creation: String,
    /// True when the artifact came from a full simulation.
    pub simulated: bool,
}

pub struct ProposalLifecycleService {
    store: Arc<dyn ProposalStore>,
    require_expected_state: bool,
    allow_portfolio_change_on_new_version: bool,
    require_simulation: bool,
    store_evidence_bundle: bool,
}

impl ProposalLifecycleService {
    pub fn new(
        store: Arc<dyn ProposalStore>,
        require_expected_state: bool,
        allow_portfolio_change_on_new_version: bool,
        require_simulation: bool,
        store_evidence_bundle: bool,
    ) -> Self {
        Self {
            store,
            require_expected_state,
            allow_portfolio_change_on_new_version,
            require_simulation,
            store_evidence_bundle,
        }
    }

    pub async fn create(
        &self,
        input: NewVersionInput,
        actor_id: String,
    ) -> Result<(Proposal, ProposalVersion), WorkflowError> {
        self.check_simulated(&input)?;
        let now = Utc::now();
        let proposal = Proposal {
            proposal_id: format!("prop_{}", Uuid::new_v4().simple()),
            portfolio_id: input.portfolio_id.clone(),
            state: ProposalState::Draft,
            version_no: 1,
            created_at: now,
            last_event_at: now,
        };
        let version = self.version_from(&proposal, 1, input, now);
        let event = self.event(
            &proposal.proposal_id,
            "PROPOSAL_CREATED",
            None,
            ProposalState::Draft,
            actor_id,
            None,
        );
        self.store.create_proposal(&proposal, &version, &event).await?;
        Ok((proposal, version))
    }

    pub async fn add_version(
        &self,
        proposal_id: &str,
        input: NewVersionInput,
        actor_id: String,
        expected_state: Option<ProposalState>,
    ) -> Result<(Proposal, ProposalVersion), WorkflowError> {
        self.check_simulated(&input)?;
        let mut proposal = self.load(proposal_id).await?;
        self.check_expected_state(&proposal, expected_state)?;
        if proposal.state.is_terminal() {
            return Err(WorkflowError::InvalidTransition {
                from: proposal.state.to_string(),
                to: "new version".to_string(),
            });
        }
        if !self.allow_portfolio_change_on_new_version && proposal.portfolio_id != input.portfolio_id
        {
            return Err(WorkflowError::StateConflict {
                expected: proposal.portfolio_id.clone(),
                actual: input.portfolio_id.clone(),
            });
        }

        let now = Utc::now();
        proposal.version_no += 1;
        proposal.last_event_at = now;
        // A re-versioned proposal returns to draft for a fresh review cycle.
        let from_state = proposal.state;
        proposal.state = ProposalState::Draft;

        let version = self.version_from(&proposal, proposal.version_no, input, now);
        let event = self.event(
            proposal_id,
            "VERSION_ADDED",
            Some(from_state),
            ProposalState::Draft,
            actor_id,
            None,
        );
        self.store.append_version(&proposal, &version, &event).await?;
        Ok((proposal, version))
    }

    pub async fn transition(
        &self,
        proposal_id: &str,
        to_state: ProposalState,
        actor_id: String,
        expected_state: Option<ProposalState>,
        comment: Option<String>,
    ) -> Result<Proposal, WorkflowError> {
        let mut proposal = self.load(proposal_id).await?;
        self.check_expected_state(&proposal, expected_state)?;
        if !proposal.state.can_transition_to(to_state) {
            return Err(WorkflowError::InvalidTransition {
                from: proposal.state.to_string(),
                to: to_state.to_string(),
            });
        }

        let from_state = proposal.state;
        proposal.state = to_state;
        proposal.last_event_at = Utc::now();
        let event = self.event(
            proposal_id,
            "STATE_CHANGED",
            Some(from_state),
            to_state,
            actor_id,
            comment,
        );
        self.store.transition(&proposal, &event).await?;
        Ok(proposal)
    }

    pub async fn approve(
        &self,
        proposal_id: &str,
        role: String,
        actor_id: String,
        comment: Option<String>,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let proposal = self.load(proposal_id).await?;
        let approval = ApprovalRecord {
            approval_id: format!("appr_{}", Uuid::new_v4().simple()),
            proposal_id: proposal_id.to_string(),
            version_no: proposal.version_no,
            role,
            actor_id,
            comment,
            approved_at: Utc::now(),
        };
        self.store.append_approval(&approval).await?;
        Ok(approval)
    }

    pub async fn load(&self, proposal_id: &str) -> Result<Proposal, WorkflowError> {
        self.store
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| WorkflowError::ProposalNotFound {
                proposal_id: proposal_id.to_string(),
            })
    }

    pub fn store(&self) -> &Arc<dyn ProposalStore> {
        &self.store
    }

    fn check_simulated(&self, input: &NewVersionInput) -> Result<(), WorkflowError> {
        if self.require_simulation && !input.simulated {
            return Err(WorkflowError::StateConflict {
                expected: "simulated artifact".to_string(),
                actual: "unsimulated artifact".to_string(),
            });
        }
        Ok(())
    }

    fn check_expected_state(
        &self,
        proposal: &Proposal,
        expected_state: Option<ProposalState>,
    ) -> Result<(), WorkflowError> {
        match expected_state {
            Some(expected) if expected != proposal.state => Err(WorkflowError::StateConflict {
                expected: expected.to_string(),
                actual: proposal.state.to_string(),
            }),
            Some(_) => Ok(()),
            None if self.require_expected_state => Err(WorkflowError::StateConflict {
                expected: "expected_state to be supplied".to_string(),
                actual: "absent".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn version_from(
        &self,
        proposal: &Proposal,
        version_no: i32,
        input: NewVersionInput,
        now: chrono::DateTime<Utc>,
    ) -> ProposalVersion {
        ProposalVersion {
            proposal_id: proposal.proposal_id.clone(),
            version_no,
            request_hash: input.request_hash,
            artifact_hash: input.artifact_hash,
            artifact_json: input.artifact_json,
            evidence_bundle_json: if self.store_evidence_bundle {
                input.evidence_bundle_json
            } else {
                None
            },
            gate_decision_json: input.gate_decision_json,
            status_at_creation: input.status_at_creation,
            created_at: now,
        }
    }

    fn event(
        &self,
        proposal_id: &str,
        event_type: &str,
        from_state: Option<ProposalState>,
        to_state: ProposalState,
        actor_id: String,
        comment: Option<String>,
    ) -> WorkflowEvent {
        WorkflowEvent {
            event_id: format!("evt_{}", Uuid::new_v4().simple()),
            proposal_id: proposal_id.to_string(),
            event_type: event_type.to_string(),
            from_state,
            to_state,
            actor_id,
            comment,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::memory_proposal_store::MemoryProposalStore;
    use serde_json::json;

    fn input(portfolio_id: &str) -> NewVersionInput {
        NewVersionInput {
            portfolio_id: portfolio_id.to_string(),
            request_hash: "sha256:req".to_string(),
            artifact_hash: "sha256:art".to_string(),
            artifact_json: json!({"proposal": {}}),
            evidence_bundle_json: Some(json!({"hashes": {}})),
            gate_decision_json: None,
            status_at_creation: "READY".to_string(),
            simulated: true,
        }
    }

    fn service(require_expected: bool) -> ProposalLifecycleService {
        ProposalLifecycleService::new(
            Arc::new(MemoryProposalStore::new()),
            require_expected,
            false,
            true,
            true,
        )
    }

    #[tokio::test]
    async fn test_create_and_transition_happy_path() {
        let service = service(false);
        let (proposal, version) = service
            .create(input("p1"), "advisor_1".to_string())
            .await
            .unwrap();
        assert_eq!(proposal.state, ProposalState::Draft);
        assert_eq!(version.version_no, 1);

        let proposal = service
            .transition(
                &proposal.proposal_id,
                ProposalState::RiskReview,
                "advisor_1".to_string(),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(proposal.state, ProposalState::RiskReview);

        let events = service.store().list_events(&proposal.proposal_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "PROPOSAL_CREATED");
        assert_eq!(events[1].event_type, "STATE_CHANGED");
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let service = service(false);
        let (proposal, _) = service
            .create(input("p1"), "advisor_1".to_string())
            .await
            .unwrap();
        let err = service
            .transition(
                &proposal.proposal_id,
                ProposalState::Executed,
                "advisor_1".to_string(),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_expected_state_conflict() {
        let service = service(true);
        let (proposal, _) = service
            .create(input("p1"), "advisor_1".to_string())
            .await
            .unwrap();

        // Missing expected_state is refused when required.
        let err = service
            .transition(
                &proposal.proposal_id,
                ProposalState::RiskReview,
                "advisor_1".to_string(),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { .. }));

        // Wrong expected_state is refused.
        let err = service
            .transition(
                &proposal.proposal_id,
                ProposalState::RiskReview,
                "advisor_1".to_string(),
                Some(ProposalState::ComplianceReview),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { .. }));

        // Correct expected_state goes through.
        service
            .transition(
                &proposal.proposal_id,
                ProposalState::RiskReview,
                "advisor_1".to_string(),
                Some(ProposalState::Draft),
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_new_version_resets_to_draft() {
        let service = service(false);
        let (proposal, _) = service
            .create(input("p1"), "advisor_1".to_string())
            .await
            .unwrap();
        service
            .transition(
                &proposal.proposal_id,
                ProposalState::RiskReview,
                "advisor_1".to_string(),
                None,
                None,
            )
            .await
            .unwrap();
        let (proposal, version) = service
            .add_version(&proposal.proposal_id, input("p1"), "advisor_1".to_string(), None)
            .await
            .unwrap();
        assert_eq!(proposal.state, ProposalState::Draft);
        assert_eq!(version.version_no, 2);
    }

    #[tokio::test]
    async fn test_portfolio_change_rejected() {
        let service = service(false);
        let (proposal, _) = service
            .create(input("p1"), "advisor_1".to_string())
            .await
            .unwrap();
        let err = service
            .add_version(&proposal.proposal_id, input("p2"), "advisor_1".to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_unsimulated_artifact_rejected() {
        let service = service(false);
        let mut unsimulated = input("p1");
        unsimulated.simulated = false;
        let err = service
            .create(unsimulated, "advisor_1".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { .. }));
    }
}
