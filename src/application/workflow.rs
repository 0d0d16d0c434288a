//! Run-level workflow decisions: append reviewer actions and derive the
//! current workflow status.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::WorkflowError;
use crate::domain::model::records::{RunRecord, WorkflowAction, WorkflowDecision, WorkflowStatus};
use crate::domain::ports::SupportabilityStore;

pub struct WorkflowService {
    store: Arc<dyn SupportabilityStore>,
    /// Run statuses that require review before execution.
    requires_review_statuses: Vec<String>,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn SupportabilityStore>, requires_review_statuses: Vec<String>) -> Self {
        Self {
            store,
            requires_review_statuses,
        }
    }

    /// Current workflow status: derived from the decision history, or from
    /// the run status when no decisions exist yet.
    pub fn derive_status(&self, run: &RunRecord, decisions: &[WorkflowDecision]) -> WorkflowStatus {
        match decisions.last().map(|d| d.action) {
            Some(WorkflowAction::Approve) => WorkflowStatus::Approved,
            Some(WorkflowAction::Reject) => WorkflowStatus::Rejected,
            Some(WorkflowAction::RequestChanges) => WorkflowStatus::PendingReview,
            None => {
                if self.requires_review_statuses.contains(&run.status) {
                    WorkflowStatus::PendingReview
                } else {
                    WorkflowStatus::NotRequired
                }
            }
        }
    }

    pub async fn status_of(&self, run_id: &str) -> Result<WorkflowStatus, WorkflowError> {
        let run = self.load_run(run_id).await?;
        let decisions = self.store.list_workflow_decisions_by_run(run_id).await?;
        Ok(self.derive_status(&run, &decisions))
    }

    /// Append a reviewer decision. Decisions on runs that do not require
    /// review are refused.
    #[allow(clippy::too_many_arguments)]
    pub async fn act(
        &self,
        run_id: &str,
        action: WorkflowAction,
        reason_code: String,
        comment: Option<String>,
        actor_id: String,
        correlation_id: String,
    ) -> Result<WorkflowDecision, WorkflowError> {
        let run = self.load_run(run_id).await?;
        let decisions = self.store.list_workflow_decisions_by_run(run_id).await?;
        if decisions.is_empty() && self.derive_status(&run, &decisions) == WorkflowStatus::NotRequired
        {
            return Err(WorkflowError::ReviewNotRequired {
                run_id: run_id.to_string(),
            });
        }

        let decision = WorkflowDecision {
            decision_id: format!("dec_{}", Uuid::new_v4().simple()),
            run_id: run_id.to_string(),
            action,
            reason_code,
            comment,
            actor_id,
            decided_at: Utc::now(),
            correlation_id,
        };
        self.store.append_workflow_decision(&decision).await?;
        Ok(decision)
    }

    pub async fn history(&self, run_id: &str) -> Result<Vec<WorkflowDecision>, WorkflowError> {
        self.load_run(run_id).await?;
        Ok(self.store.list_workflow_decisions_by_run(run_id).await?)
    }

    async fn load_run(&self, run_id: &str) -> Result<RunRecord, WorkflowError> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::memory_store::MemoryStore;
    use serde_json::json;

    fn run(status: &str) -> RunRecord {
        RunRecord {
            rebalance_run_id: "run_1".to_string(),
            correlation_id: "c_1".to_string(),
            request_hash: "sha256:x".to_string(),
            idempotency_key: None,
            portfolio_id: "p1".to_string(),
            status: status.to_string(),
            created_at: Utc::now(),
            result_json: json!({}),
        }
    }

    fn service(store: Arc<dyn SupportabilityStore>) -> WorkflowService {
        WorkflowService::new(store, vec!["PENDING_REVIEW".to_string()])
    }

    #[tokio::test]
    async fn test_status_derivation_from_run_status() {
        let store: Arc<dyn SupportabilityStore> = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        store.save_run(&run("PENDING_REVIEW"), None, &[]).await.unwrap();
        assert_eq!(
            service.status_of("run_1").await.unwrap(),
            WorkflowStatus::PendingReview
        );
    }

    #[tokio::test]
    async fn test_ready_run_not_required() {
        let store: Arc<dyn SupportabilityStore> = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        store.save_run(&run("READY"), None, &[]).await.unwrap();
        assert_eq!(
            service.status_of("run_1").await.unwrap(),
            WorkflowStatus::NotRequired
        );
        let err = service
            .act(
                "run_1",
                WorkflowAction::Approve,
                "OK".to_string(),
                None,
                "reviewer_1".to_string(),
                "c_2".to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ReviewNotRequired { .. }));
    }

    #[tokio::test]
    async fn test_decision_history_drives_status() {
        let store: Arc<dyn SupportabilityStore> = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        store.save_run(&run("PENDING_REVIEW"), None, &[]).await.unwrap();

        service
            .act(
                "run_1",
                WorkflowAction::RequestChanges,
                "NEEDS_WORK".to_string(),
                Some("tighten cash".to_string()),
                "reviewer_1".to_string(),
                "c_2".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(
            service.status_of("run_1").await.unwrap(),
            WorkflowStatus::PendingReview
        );

        service
            .act(
                "run_1",
                WorkflowAction::Approve,
                "OK".to_string(),
                None,
                "reviewer_2".to_string(),
                "c_3".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(
            service.status_of("run_1").await.unwrap(),
            WorkflowStatus::Approved
        );
        assert_eq!(service.history("run_1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_run() {
        let store: Arc<dyn SupportabilityStore> = Arc::new(MemoryStore::new());
        let service = service(store);
        assert!(matches!(
            service.status_of("run_missing").await,
            Err(WorkflowError::RunNotFound { .. })
        ));
    }
}
