//! DPM simulation and batch analysis handlers.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::time::Instant;
use tracing::error;

use crate::application::simulation_service::SimulateOutcome;
use crate::domain::model::request::{AnalyzeRequest, RebalanceRequest};

use super::super::headers::request_context;
use super::super::problem::Problem;
use super::super::state::AppState;

pub async fn simulate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RebalanceRequest>,
) -> Result<Response, Problem> {
    let ctx = request_context(&headers, true)?;
    request.validate().map_err(Problem::from_validation)?;

    let started = Instant::now();
    let outcome = state
        .simulation
        .simulate_rebalance(request, &ctx)
        .await
        .map_err(|err| {
            if matches!(
                err,
                crate::application::simulation_service::ServiceError::Store(
                    crate::domain::errors::StoreError::IdempotencyConflict { .. }
                )
            ) {
                state
                    .metrics
                    .idempotency_conflicts_total
                    .with_label_values(&["dpm"])
                    .inc();
            }
            Problem::from_service(err)
        })?;
    state
        .metrics
        .pipeline_latency_seconds
        .with_label_values(&["dpm"])
        .observe(started.elapsed().as_secs_f64());

    match outcome {
        SimulateOutcome::Fresh(result) => {
            state
                .metrics
                .runs_total
                .with_label_values(&["dpm", &result.status.to_string()])
                .inc();
            Ok(Json(*result).into_response())
        }
        SimulateOutcome::Replay(response) => {
            state
                .metrics
                .idempotent_replays_total
                .with_label_values(&["dpm"])
                .inc();
            Ok(Json(response).into_response())
        }
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Response, Problem> {
    let ctx = request_context(&headers, false)?;
    request.validate().map_err(Problem::from_validation)?;

    let response = state
        .simulation
        .analyze(&request, &ctx)
        .map_err(Problem::from_service)?;
    Ok(Json(response).into_response())
}

pub const OPERATION_TYPE_ANALYZE: &str = "rebalance_analyze";

pub async fn analyze_async(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Response, Problem> {
    if !state.config.async_ops.enabled {
        return Err(Problem::feature_disabled("DPM_ASYNC_OPERATIONS_DISABLED"));
    }
    let ctx = request_context(&headers, false)?;
    request.validate().map_err(Problem::from_validation)?;

    let request_json = serde_json::to_value(&request)
        .map_err(|e| Problem::internal(format!("request serialization: {e}")))?;
    let operation = state
        .async_ops
        .submit(
            OPERATION_TYPE_ANALYZE,
            ctx.correlation_id.clone(),
            request_json,
        )
        .await
        .map_err(Problem::from_store)?;

    // Record the operation -> correlation lineage edge.
    let edge = crate::domain::model::records::LineageEdge {
        source_entity_id: operation.operation_id.clone(),
        edge_type: crate::domain::model::records::LineageEdgeType::OperationToCorrelation,
        target_entity_id: operation.correlation_id.clone(),
        created_at: operation.created_at,
        metadata: None,
    };
    state
        .store
        .append_lineage_edge(&edge)
        .await
        .map_err(Problem::from_store)?;

    let operation = match state.async_ops.mode() {
        crate::application::async_ops::ExecutionMode::Inline => {
            execute_analyze(&state, operation, &ctx).await?
        }
        crate::application::async_ops::ExecutionMode::AcceptOnly => operation,
    };

    let execute_url = format!("/rebalance/operations/{}/execute", operation.operation_id);
    let body = json!({
        "operation": operation,
        "execute_url": execute_url,
    });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// Drive one PENDING analyze operation to a terminal state.
pub async fn execute_analyze(
    state: &AppState,
    operation: crate::domain::model::records::AsyncOperation,
    ctx: &crate::application::simulation_service::RequestContext,
) -> Result<crate::domain::model::records::AsyncOperation, Problem> {
    let operation = state
        .async_ops
        .begin(&operation.operation_id)
        .await
        .map_err(Problem::from_store)?;

    let parsed: Result<AnalyzeRequest, _> = serde_json::from_value(operation.request_json.clone());
    let operation = match parsed {
        Ok(request) => match state.simulation.analyze(&request, ctx) {
            Ok(response) => {
                let result_json = serde_json::to_value(&response)
                    .map_err(|e| Problem::internal(format!("result serialization: {e}")))?;
                state
                    .async_ops
                    .complete(operation, result_json)
                    .await
                    .map_err(Problem::from_store)?
            }
            Err(err) => {
                error!("Async analyze failed: {err}");
                state
                    .async_ops
                    .fail(operation, json!({"error": err.to_string()}))
                    .await
                    .map_err(Problem::from_store)?
            }
        },
        Err(err) => state
            .async_ops
            .fail(operation, json!({"error": format!("INVALID_REQUEST: {err}")}))
            .await
            .map_err(Problem::from_store)?,
    };

    state
        .metrics
        .async_operations_total
        .with_label_values(&[OPERATION_TYPE_ANALYZE, &operation.status.to_string()])
        .inc();
    Ok(operation)
}
