//! Advisory proposal handlers: simulation, artifact packaging, and the
//! gated lifecycle resource.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;

use crate::application::advisory::artifact;
use crate::application::proposal_lifecycle::NewVersionInput;
use crate::application::simulation_service::ProposalOutcome;
use crate::domain::model::proposal::ProposalState;
use crate::domain::model::request::ProposalRequest;
use crate::domain::model::result::ProposalResult;

use super::super::headers::request_context;
use super::super::problem::Problem;
use super::super::state::{AppState, clamp_limit};

fn lifecycle_gate(state: &AppState) -> Result<(), Problem> {
    if !state.config.proposal.workflow_lifecycle_enabled {
        return Err(Problem::feature_disabled(
            "PROPOSAL_WORKFLOW_LIFECYCLE_DISABLED",
        ));
    }
    Ok(())
}

pub async fn simulate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProposalRequest>,
) -> Result<Response, Problem> {
    let ctx = request_context(&headers, false)?;
    request.validate().map_err(Problem::from_validation)?;

    let started = Instant::now();
    let outcome = state
        .simulation
        .simulate_proposal(request, &ctx)
        .await
        .map_err(Problem::from_service)?;
    state
        .metrics
        .pipeline_latency_seconds
        .with_label_values(&["advisory"])
        .observe(started.elapsed().as_secs_f64());

    match outcome {
        ProposalOutcome::Fresh(result) => {
            state
                .metrics
                .runs_total
                .with_label_values(&["advisory", &result.status.to_string()])
                .inc();
            Ok(Json(*result).into_response())
        }
        ProposalOutcome::Replay(response) => {
            state
                .metrics
                .idempotent_replays_total
                .with_label_values(&["advisory"])
                .inc();
            Ok(Json(response).into_response())
        }
    }
}

pub async fn build_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProposalRequest>,
) -> Result<Response, Problem> {
    let ctx = request_context(&headers, false)?;
    request.validate().map_err(Problem::from_validation)?;

    let (result_json, request_hash) = simulate_for_artifact(&state, request, &ctx).await?;
    let built = artifact::build_artifact(&result_json, &request_hash, Utc::now())
        .map_err(|e| Problem::validation(e.to_string()))?;
    Ok(Json(built).into_response())
}

/// Run the advisory pipeline and return the result payload plus its
/// request hash, replay-aware.
async fn simulate_for_artifact(
    state: &AppState,
    request: ProposalRequest,
    ctx: &crate::application::simulation_service::RequestContext,
) -> Result<(serde_json::Value, String), Problem> {
    let request_hash = crate::domain::canonical::hash_canonical(&request)
        .map_err(|e| Problem::validation(e.to_string()))?;
    let outcome = state
        .simulation
        .simulate_proposal(request, ctx)
        .await
        .map_err(Problem::from_service)?;
    let result_json = match outcome {
        ProposalOutcome::Fresh(result) => serde_json::to_value(*result)
            .map_err(|e| Problem::internal(format!("result serialization: {e}")))?,
        ProposalOutcome::Replay(response) => response,
    };
    Ok((result_json, request_hash))
}

#[derive(Debug, Deserialize)]
pub struct CreateProposalBody {
    pub actor_id: String,
    pub request: ProposalRequest,
}

pub async fn create_proposal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProposalBody>,
) -> Result<Response, Problem> {
    lifecycle_gate(&state)?;
    let ctx = request_context(&headers, false)?;
    body.request.validate().map_err(Problem::from_validation)?;

    let input = version_input(&state, body.request, &ctx).await?;
    let (proposal, version) = state
        .proposals
        .create(input, body.actor_id)
        .await
        .map_err(Problem::from_workflow)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "proposal": proposal,
            "version_no": version.version_no,
            "artifact_hash": version.artifact_hash,
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct NewVersionBody {
    pub actor_id: String,
    pub request: ProposalRequest,
    #[serde(default)]
    pub expected_state: Option<ProposalState>,
}

pub async fn add_version(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<NewVersionBody>,
) -> Result<Response, Problem> {
    lifecycle_gate(&state)?;
    let ctx = request_context(&headers, false)?;
    body.request.validate().map_err(Problem::from_validation)?;

    let input = version_input(&state, body.request, &ctx).await?;
    let (proposal, version) = state
        .proposals
        .add_version(&proposal_id, input, body.actor_id, body.expected_state)
        .await
        .map_err(Problem::from_workflow)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "proposal": proposal,
            "version_no": version.version_no,
            "artifact_hash": version.artifact_hash,
        })),
    )
        .into_response())
}

async fn version_input(
    state: &AppState,
    request: ProposalRequest,
    ctx: &crate::application::simulation_service::RequestContext,
) -> Result<NewVersionInput, Problem> {
    let portfolio_id = request.portfolio.portfolio_id.clone();
    let simulated = request.options.enable_proposal_simulation;
    let (result_json, request_hash) = simulate_for_artifact(state, request, ctx).await?;
    let built = artifact::build_artifact(&result_json, &request_hash, Utc::now())
        .map_err(|e| Problem::validation(e.to_string()))?;
    let artifact_hash = artifact::embedded_hash(&built)
        .unwrap_or_default()
        .to_string();

    let parsed: Option<ProposalResult> = serde_json::from_value(result_json.clone()).ok();
    let status_at_creation = parsed
        .as_ref()
        .map(|r| r.status.to_string())
        .unwrap_or_else(|| "READY".to_string());
    let gate_decision_json = parsed
        .as_ref()
        .and_then(|r| r.gate_decision.as_ref())
        .and_then(|g| serde_json::to_value(g).ok());

    Ok(NewVersionInput {
        portfolio_id,
        request_hash,
        artifact_hash,
        evidence_bundle_json: built.get("evidence_bundle").cloned(),
        artifact_json: built,
        gate_decision_json,
        status_at_creation,
        simulated,
    })
}

pub async fn get_proposal(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
) -> Result<Response, Problem> {
    lifecycle_gate(&state)?;
    let proposal = state
        .proposals
        .load(&proposal_id)
        .await
        .map_err(Problem::from_workflow)?;
    let events = state
        .proposals
        .store()
        .list_events(&proposal_id)
        .await
        .map_err(Problem::from_store)?;
    let approvals = state
        .proposals
        .store()
        .list_approvals(&proposal_id)
        .await
        .map_err(Problem::from_store)?;
    Ok(Json(json!({
        "proposal": proposal,
        "events": events,
        "approvals": approvals,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ProposalListParams {
    pub portfolio_id: Option<String>,
    pub state: Option<ProposalState>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_proposals(
    State(state): State<AppState>,
    Query(params): Query<ProposalListParams>,
) -> Result<Response, Problem> {
    lifecycle_gate(&state)?;
    let page = state
        .proposals
        .store()
        .list_proposals(
            params.portfolio_id.as_deref(),
            params.state,
            params.cursor.as_deref(),
            clamp_limit(params.limit),
        )
        .await
        .map_err(Problem::from_store)?;
    Ok(Json(page).into_response())
}

pub async fn get_version(
    State(state): State<AppState>,
    Path((proposal_id, version_no)): Path<(String, i32)>,
) -> Result<Response, Problem> {
    lifecycle_gate(&state)?;
    let version = state
        .proposals
        .store()
        .get_version(&proposal_id, version_no)
        .await
        .map_err(Problem::from_store)?
        .ok_or_else(|| {
            Problem::not_found(format!("version {version_no} not found for {proposal_id}"))
        })?;
    Ok(Json(version).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub to_state: ProposalState,
    pub actor_id: String,
    #[serde(default)]
    pub expected_state: Option<ProposalState>,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn transition(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Result<Response, Problem> {
    lifecycle_gate(&state)?;
    let proposal = state
        .proposals
        .transition(
            &proposal_id,
            body.to_state,
            body.actor_id,
            body.expected_state,
            body.comment,
        )
        .await
        .map_err(Problem::from_workflow)?;
    Ok(Json(proposal).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ApprovalBody {
    pub role: String,
    pub actor_id: String,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn approve(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
    Json(body): Json<ApprovalBody>,
) -> Result<Response, Problem> {
    lifecycle_gate(&state)?;
    let approval = state
        .proposals
        .approve(&proposal_id, body.role, body.actor_id, body.comment)
        .await
        .map_err(Problem::from_workflow)?;
    Ok((StatusCode::CREATED, Json(approval)).into_response())
}
