//! Run lookup, artifact, and support-bundle handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::application::support_bundle::build_support_bundle;
use crate::domain::model::records::{RunFilter, RunRecord};

use super::super::problem::Problem;
use super::super::state::{AppState, clamp_limit};

fn gate(state: &AppState) -> Result<(), Problem> {
    if !state.config.supportability.support_apis_enabled {
        return Err(Problem::feature_disabled("DPM_SUPPORT_APIS_DISABLED"));
    }
    Ok(())
}

pub(crate) async fn run_or_404(state: &AppState, run_id: &str) -> Result<RunRecord, Problem> {
    state
        .store
        .get_run(run_id)
        .await
        .map_err(Problem::from_store)?
        .ok_or_else(|| Problem::not_found(format!("run not found: {run_id}")))
}

pub(crate) async fn run_by_correlation_or_404(
    state: &AppState,
    correlation_id: &str,
) -> Result<RunRecord, Problem> {
    state
        .store
        .get_run_by_correlation(correlation_id)
        .await
        .map_err(Problem::from_store)?
        .ok_or_else(|| Problem::not_found(format!("run not found for correlation: {correlation_id}")))
}

pub(crate) async fn run_by_idempotency_or_404(
    state: &AppState,
    key: &str,
) -> Result<RunRecord, Problem> {
    let record = state
        .store
        .get_idempotency_by_key(key)
        .await
        .map_err(Problem::from_store)?
        .ok_or_else(|| Problem::not_found(format!("idempotency key not found: {key}")))?;
    run_or_404(state, &record.run_id).await
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    Ok(Json(run_or_404(&state, &run_id).await?).into_response())
}

pub async fn get_run_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    Ok(Json(run_by_correlation_or_404(&state, &correlation_id).await?).into_response())
}

pub async fn get_run_by_idempotency(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    Ok(Json(run_by_idempotency_or_404(&state, &key).await?).into_response())
}

pub async fn get_run_by_request_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let run = state
        .store
        .get_run_by_request_hash(&hash)
        .await
        .map_err(Problem::from_store)?
        .ok_or_else(|| Problem::not_found(format!("run not found for request hash: {hash}")))?;
    Ok(Json(run).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RunListParams {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub status: Option<String>,
    pub portfolio_id: Option<String>,
    pub request_hash: Option<String>,
    pub correlation_id: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<RunListParams>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let filter = RunFilter {
        from: params.from,
        to: params.to,
        status: params.status,
        portfolio_id: params.portfolio_id,
        request_hash: params.request_hash,
        correlation_id: params.correlation_id,
    };
    let page = state
        .store
        .list_runs(&filter, params.cursor.as_deref(), clamp_limit(params.limit))
        .await
        .map_err(Problem::from_store)?;
    Ok(Json(page).into_response())
}

pub async fn get_run_artifact(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let artifact = state
        .simulation
        .run_artifact(&run_id)
        .await
        .map_err(Problem::from_service)?
        .ok_or_else(|| Problem::not_found(format!("run not found: {run_id}")))?;
    Ok(Json(artifact).into_response())
}

pub async fn get_support_bundle(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    bundle_response(&state, &run_id).await
}

pub async fn get_support_bundle_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let run = run_by_correlation_or_404(&state, &correlation_id).await?;
    bundle_response(&state, &run.rebalance_run_id).await
}

pub async fn get_support_bundle_by_idempotency(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let run = run_by_idempotency_or_404(&state, &key).await?;
    bundle_response(&state, &run.rebalance_run_id).await
}

pub async fn get_support_bundle_by_operation(
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
    let run = run_by_correlation_or_404(&state, &operation.correlation_id).await?;
    bundle_response(&state, &run.rebalance_run_id).await
}

async fn bundle_response(state: &AppState, run_id: &str) -> Result<Response, Problem> {
    let bundle = build_support_bundle(&state.store, &state.workflow, run_id)
        .await
        .map_err(Problem::from_workflow)?
        .ok_or_else(|| Problem::not_found(format!("run not found: {run_id}")))?;
    Ok(Json(bundle).into_response())
}
