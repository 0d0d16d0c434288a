//! Run-workflow handlers: status, actions, history, global listings.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::domain::model::records::{DecisionFilter, WorkflowAction};

use super::super::headers::request_context;
use super::super::problem::Problem;
use super::super::state::{AppState, clamp_limit};
use super::runs::{run_by_correlation_or_404, run_by_idempotency_or_404, run_or_404};

fn gate(state: &AppState) -> Result<(), Problem> {
    if !state.config.workflow.enabled {
        return Err(Problem::feature_disabled("DPM_WORKFLOW_DISABLED"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: WorkflowAction,
    pub reason_code: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub actor_id: String,
}

async fn status_response(state: &AppState, run_id: &str) -> Result<Response, Problem> {
    let status = state
        .workflow
        .status_of(run_id)
        .await
        .map_err(Problem::from_workflow)?;
    Ok(Json(json!({
        "run_id": run_id,
        "workflow_status": status,
    }))
    .into_response())
}

async fn act_response(
    state: &AppState,
    run_id: &str,
    request: ActionRequest,
    headers: &HeaderMap,
) -> Result<Response, Problem> {
    let ctx = request_context(headers, false)?;
    let decision = state
        .workflow
        .act(
            run_id,
            request.action,
            request.reason_code,
            request.comment,
            request.actor_id,
            ctx.correlation_id,
        )
        .await
        .map_err(Problem::from_workflow)?;
    state
        .metrics
        .workflow_decisions_total
        .with_label_values(&[&decision.action.to_string()])
        .inc();
    Ok(Json(decision).into_response())
}

pub async fn get_workflow(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    run_or_404(&state, &run_id).await?;
    status_response(&state, &run_id).await
}

pub async fn post_action(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Result<Response, Problem> {
    gate(&state)?;
    act_response(&state, &run_id, request, &headers).await
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let history = state
        .workflow
        .history(&run_id)
        .await
        .map_err(Problem::from_workflow)?;
    Ok(Json(history).into_response())
}

pub async fn get_workflow_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let run = run_by_correlation_or_404(&state, &correlation_id).await?;
    status_response(&state, &run.rebalance_run_id).await
}

pub async fn post_action_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let run = run_by_correlation_or_404(&state, &correlation_id).await?;
    act_response(&state, &run.rebalance_run_id, request, &headers).await
}

pub async fn get_workflow_by_idempotency(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let run = run_by_idempotency_or_404(&state, &key).await?;
    status_response(&state, &run.rebalance_run_id).await
}

pub async fn post_action_by_idempotency(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let run = run_by_idempotency_or_404(&state, &key).await?;
    act_response(&state, &run.rebalance_run_id, request, &headers).await
}

pub async fn get_history_by_idempotency(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let run = run_by_idempotency_or_404(&state, &key).await?;
    let history = state
        .workflow
        .history(&run.rebalance_run_id)
        .await
        .map_err(Problem::from_workflow)?;
    Ok(Json(history).into_response())
}

pub async fn get_history_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let run = run_by_correlation_or_404(&state, &correlation_id).await?;
    let history = state
        .workflow
        .history(&run.rebalance_run_id)
        .await
        .map_err(Problem::from_workflow)?;
    Ok(Json(history).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DecisionListParams {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub reason_code: Option<String>,
    pub correlation_id: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_decisions(
    State(state): State<AppState>,
    Query(params): Query<DecisionListParams>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let filter = DecisionFilter {
        from: params.from,
        to: params.to,
        actor_id: params.actor_id,
        action: params.action,
        reason_code: params.reason_code,
        correlation_id: params.correlation_id,
    };
    let page = state
        .store
        .list_workflow_decisions(&filter, params.cursor.as_deref(), clamp_limit(params.limit))
        .await
        .map_err(Problem::from_store)?;
    Ok(Json(page).into_response())
}

pub async fn list_decisions_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Response, Problem> {
    gate(&state)?;
    let filter = DecisionFilter {
        correlation_id: Some(correlation_id),
        ..DecisionFilter::default()
    };
    let page = state
        .store
        .list_workflow_decisions(&filter, None, MAX_DECISIONS_BY_CORRELATION)
        .await
        .map_err(Problem::from_store)?;
    Ok(Json(page.items).into_response())
}

const MAX_DECISIONS_BY_CORRELATION: usize = 200;
