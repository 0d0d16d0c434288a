//! Route table.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health, operations, policies, proposals, rebalance, runs, supportability, workflow,
};
use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Service endpoints
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        // DPM simulation
        .route("/rebalance/simulate", post(rebalance::simulate))
        .route("/rebalance/analyze", post(rebalance::analyze))
        .route("/rebalance/analyze/async", post(rebalance::analyze_async))
        // Async operations
        .route("/rebalance/operations", get(operations::list_operations))
        .route("/rebalance/operations/:id", get(operations::get_operation))
        .route(
            "/rebalance/operations/by-correlation/:cid",
            get(operations::get_operation_by_correlation),
        )
        .route(
            "/rebalance/operations/:id/execute",
            post(operations::execute_operation),
        )
        // Run lookups
        .route("/rebalance/runs", get(runs::list_runs))
        .route("/rebalance/runs/:id", get(runs::get_run))
        .route(
            "/rebalance/runs/by-correlation/:cid",
            get(runs::get_run_by_correlation),
        )
        .route(
            "/rebalance/runs/idempotency/:key",
            get(runs::get_run_by_idempotency),
        )
        .route(
            "/rebalance/runs/by-request-hash/:hash",
            get(runs::get_run_by_request_hash),
        )
        .route("/rebalance/runs/:id/artifact", get(runs::get_run_artifact))
        .route(
            "/rebalance/runs/:id/support-bundle",
            get(runs::get_support_bundle),
        )
        .route(
            "/rebalance/runs/by-correlation/:cid/support-bundle",
            get(runs::get_support_bundle_by_correlation),
        )
        .route(
            "/rebalance/runs/idempotency/:key/support-bundle",
            get(runs::get_support_bundle_by_idempotency),
        )
        .route(
            "/rebalance/runs/by-operation/:id/support-bundle",
            get(runs::get_support_bundle_by_operation),
        )
        // Run workflow
        .route(
            "/rebalance/runs/:id/workflow",
            get(workflow::get_workflow).post(workflow::post_action),
        )
        .route(
            "/rebalance/runs/:id/workflow/actions",
            post(workflow::post_action),
        )
        .route(
            "/rebalance/runs/:id/workflow/history",
            get(workflow::get_history),
        )
        .route(
            "/rebalance/runs/by-correlation/:cid/workflow",
            get(workflow::get_workflow_by_correlation)
                .post(workflow::post_action_by_correlation),
        )
        .route(
            "/rebalance/runs/by-correlation/:cid/workflow/history",
            get(workflow::get_history_by_correlation),
        )
        .route(
            "/rebalance/runs/idempotency/:key/workflow",
            get(workflow::get_workflow_by_idempotency)
                .post(workflow::post_action_by_idempotency),
        )
        .route(
            "/rebalance/runs/idempotency/:key/workflow/history",
            get(workflow::get_history_by_idempotency),
        )
        .route(
            "/rebalance/workflow/decisions",
            get(workflow::list_decisions),
        )
        .route(
            "/rebalance/workflow/decisions/by-correlation/:cid",
            get(workflow::list_decisions_by_correlation),
        )
        // Supportability
        .route(
            "/rebalance/supportability/summary",
            get(supportability::summary),
        )
        .route("/rebalance/lineage/:entity_id", get(supportability::lineage))
        .route(
            "/rebalance/idempotency/:key/history",
            get(supportability::idempotency_history),
        )
        // Policy packs
        .route("/rebalance/policies/effective", get(policies::effective))
        .route("/rebalance/policies/catalog", get(policies::catalog))
        // Advisory
        .route("/rebalance/proposals/simulate", post(proposals::simulate))
        .route("/rebalance/proposals/artifact", post(proposals::build_artifact))
        .route(
            "/rebalance/proposals",
            get(proposals::list_proposals).post(proposals::create_proposal),
        )
        .route("/rebalance/proposals/:id", get(proposals::get_proposal))
        .route(
            "/rebalance/proposals/:id/versions",
            post(proposals::add_version),
        )
        .route(
            "/rebalance/proposals/:id/versions/:n",
            get(proposals::get_version),
        )
        .route(
            "/rebalance/proposals/:id/transitions",
            post(proposals::transition),
        )
        .route(
            "/rebalance/proposals/:id/approvals",
            post(proposals::approve),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
