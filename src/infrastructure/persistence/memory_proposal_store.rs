//! In-memory proposal store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::StoreError;
use crate::domain::model::proposal::{
    ApprovalRecord, Proposal, ProposalState, ProposalVersion, WorkflowEvent,
};
use crate::domain::model::records::Page;
use crate::domain::ports::{ProposalStore, StoreResult};

use super::cursor;

#[derive(Default)]
struct Tables {
    proposals: Vec<Proposal>,
    versions: Vec<ProposalVersion>,
    events: Vec<WorkflowEvent>,
    approvals: Vec<ApprovalRecord>,
}

pub struct MemoryProposalStore {
    tables: RwLock<Tables>,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryProposalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProposalStore for MemoryProposalStore {
    async fn create_proposal(
        &self,
        proposal: &Proposal,
        version: &ProposalVersion,
        event: &WorkflowEvent,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .proposals
            .iter()
            .any(|p| p.proposal_id == proposal.proposal_id)
        {
            return Err(StoreError::backend("duplicate proposal id"));
        }
        tables.proposals.push(proposal.clone());
        tables.versions.push(version.clone());
        tables.events.push(event.clone());
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<Proposal>> {
        let tables = self.tables.read().await;
        Ok(tables
            .proposals
            .iter()
            .find(|p| p.proposal_id == proposal_id)
            .cloned())
    }

    async fn list_proposals(
        &self,
        portfolio_id: Option<&str>,
        state: Option<ProposalState>,
        cursor_raw: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<Proposal>> {
        let tables = self.tables.read().await;
        let mut filtered: Vec<Proposal> = tables
            .proposals
            .iter()
            .filter(|p| portfolio_id.map(|id| p.portfolio_id == id).unwrap_or(true))
            .filter(|p| state.map(|s| p.state == s).unwrap_or(true))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            (b.created_at, &b.proposal_id).cmp(&(a.created_at, &a.proposal_id))
        });

        let start = match cursor_raw {
            Some(raw) => {
                let decoded = cursor::decode(raw)?;
                filtered
                    .iter()
                    .position(|p| (p.created_at, p.proposal_id.clone()) < decoded)
                    .unwrap_or(filtered.len())
            }
            None => 0,
        };
        let page: Vec<Proposal> = filtered.into_iter().skip(start).take(limit + 1).collect();
        let has_more = page.len() > limit;
        let items: Vec<Proposal> = page.into_iter().take(limit).collect();
        let next_cursor = if has_more {
            items
                .last()
                .map(|p| cursor::encode(p.created_at, &p.proposal_id))
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    async fn get_version(
        &self,
        proposal_id: &str,
        version_no: i32,
    ) -> StoreResult<Option<ProposalVersion>> {
        let tables = self.tables.read().await;
        Ok(tables
            .versions
            .iter()
            .find(|v| v.proposal_id == proposal_id && v.version_no == version_no)
            .cloned())
    }

    async fn append_version(
        &self,
        proposal: &Proposal,
        version: &ProposalVersion,
        event: &WorkflowEvent,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .proposals
            .iter_mut()
            .find(|p| p.proposal_id == proposal.proposal_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "proposal",
                id: proposal.proposal_id.clone(),
            })?;
        *slot = proposal.clone();
        tables.versions.push(version.clone());
        tables.events.push(event.clone());
        Ok(())
    }

    async fn transition(&self, proposal: &Proposal, event: &WorkflowEvent) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .proposals
            .iter_mut()
            .find(|p| p.proposal_id == proposal.proposal_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "proposal",
                id: proposal.proposal_id.clone(),
            })?;
        *slot = proposal.clone();
        tables.events.push(event.clone());
        Ok(())
    }

    async fn append_approval(&self, approval: &ApprovalRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.approvals.push(approval.clone());
        Ok(())
    }

    async fn list_events(&self, proposal_id: &str) -> StoreResult<Vec<WorkflowEvent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.proposal_id == proposal_id)
            .cloned()
            .collect())
    }

    async fn list_approvals(&self, proposal_id: &str) -> StoreResult<Vec<ApprovalRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .approvals
            .iter()
            .filter(|a| a.proposal_id == proposal_id)
            .cloned()
            .collect())
    }

    async fn ready(&self) -> StoreResult<()> {
        Ok(())
    }
}
