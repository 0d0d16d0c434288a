//! Async operation resource handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::domain::model::records::OperationFilter;

use super::super::headers::request_context;
use super::super::problem::Problem;
use super::super::state::{AppState, clamp_limit};
use super::rebalance::execute_analyze;

fn gate(state: &AppState) -> Result<(), Problem> {
    if !state.config.async_ops.enabled {
        return Err(Problem::feature_disabled("DPM_ASYNC_OPERATIONS_DISABLED"));
    }
    Ok(())
}

pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let operation = state
        .store
        .get_async_operation(&operation_id)
        .await
        .map_err(Problem::from_store)?
        .ok_or_else(|| Problem::not_found(format!("operation not found: {operation_id}")))?;
    Ok(Json(operation).into_response())
}

pub async fn get_operation_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let operation = state
        .store
        .get_async_operation_by_correlation(&correlation_id)
        .await
        .map_err(Problem::from_store)?
        .ok_or_else(|| {
            Problem::not_found(format!("operation not found for correlation: {correlation_id}"))
        })?;
    Ok(Json(operation).into_response())
}

pub async fn execute_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, Problem> {
    gate(&state)?;
    if !state.async_ops.manual_execution_enabled() {
        return Err(Problem::feature_disabled(
            "DPM_ASYNC_MANUAL_EXECUTION_DISABLED",
        ));
    }

    let operation = state
        .store
        .get_async_operation(&operation_id)
        .await
        .map_err(Problem::from_store)?
        .ok_or_else(|| Problem::not_found(format!("operation not found: {operation_id}")))?;

    // Execution reuses the operation's own correlation; other headers may
    // refine policy resolution.
    let mut ctx = request_context(&headers, false)?;
    ctx.correlation_id = operation.correlation_id.clone();
    let executed = execute_analyze(&state, operation, &ctx).await?;
    Ok(Json(executed).into_response())
}

#[derive(Debug, Deserialize)]
pub struct OperationListParams {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub status: Option<String>,
    pub operation_type: Option<String>,
    pub correlation_id: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_operations(
    State(state): State<AppState>,
    Query(params): Query<OperationListParams>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let filter = OperationFilter {
        from: params.from,
        to: params.to,
        status: params.status,
        operation_type: params.operation_type,
        correlation_id: params.correlation_id,
    };
    let page = state
        .store
        .list_async_operations(&filter, params.cursor.as_deref(), clamp_limit(params.limit))
        .await
        .map_err(Problem::from_store)?;
    Ok(Json(page).into_response())
}
