//! Shared handler state.

use std::sync::Arc;

use crate::application::async_ops::AsyncOperationManager;
use crate::application::proposal_lifecycle::ProposalLifecycleService;
use crate::application::simulation_service::SimulationService;
use crate::application::workflow::WorkflowService;
use crate::config::Config;
use crate::domain::ports::SupportabilityStore;
use crate::infrastructure::observability::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub simulation: Arc<SimulationService>,
    pub store: Arc<dyn SupportabilityStore>,
    pub async_ops: Arc<AsyncOperationManager>,
    pub workflow: Arc<WorkflowService>,
    pub proposals: Arc<ProposalLifecycleService>,
    pub metrics: Metrics,
}

/// Default and maximum page sizes for cursor listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}
