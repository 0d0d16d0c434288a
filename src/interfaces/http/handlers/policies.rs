//! Policy pack endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use super::super::headers::request_context;
use super::super::problem::Problem;
use super::super::state::AppState;

pub async fn effective(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, Problem> {
    let ctx = request_context(&headers, false)?;
    let policy = state
        .simulation
        .resolve_policy(&ctx)
        .map_err(Problem::from_policy)?;
    Ok(Json(policy).into_response())
}

pub async fn catalog(State(state): State<AppState>) -> Result<Response, Problem> {
    if !state.simulation.policy_resolver().enabled() {
        return Err(Problem::feature_disabled("DPM_POLICY_PACKS_DISABLED"));
    }
    let packs: Vec<_> = state.simulation.policy_resolver().catalog();
    Ok(Json(packs).into_response())
}
