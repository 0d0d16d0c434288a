//! Support bundle assembly: one denormalized read view per run.

use std::sync::Arc;

use crate::domain::errors::WorkflowError;
use crate::domain::model::records::SupportBundle;
use crate::domain::ports::SupportabilityStore;

use crate::application::workflow::WorkflowService;

pub async fn build_support_bundle(
    store: &Arc<dyn SupportabilityStore>,
    workflow: &WorkflowService,
    run_id: &str,
) -> Result<Option<SupportBundle>, WorkflowError> {
    let Some(run) = store.get_run(run_id).await? else {
        return Ok(None);
    };
    let artifact = store.get_run_artifact(run_id).await?;
    let decisions = store.list_workflow_decisions_by_run(run_id).await?;
    let workflow_status = workflow.derive_status(&run, &decisions);
    let lineage_edges = store.list_lineage_edges(run_id).await?;

    Ok(Some(SupportBundle {
        run,
        artifact,
        workflow_status,
        workflow_decisions: decisions,
        lineage_edges,
    }))
}
