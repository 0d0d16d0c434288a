//! Supportability surface: summary, lineage, idempotency history.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use super::super::problem::Problem;
use super::super::state::AppState;

pub async fn summary(State(state): State<AppState>) -> Result<Response, Problem> {
    if !state.config.supportability.summary_apis_enabled {
        return Err(Problem::feature_disabled(
            "DPM_SUPPORTABILITY_SUMMARY_APIS_DISABLED",
        ));
    }
    let summary = state
        .store
        .supportability_summary()
        .await
        .map_err(Problem::from_store)?;
    Ok(Json(summary).into_response())
}

pub async fn lineage(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Response, Problem> {
    if !state.config.supportability.lineage_apis_enabled {
        return Err(Problem::feature_disabled("DPM_LINEAGE_APIS_DISABLED"));
    }
    let edges = state
        .store
        .list_lineage_edges(&entity_id)
        .await
        .map_err(Problem::from_store)?;
    Ok(Json(edges).into_response())
}

pub async fn idempotency_history(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, Problem> {
    if !state.config.supportability.idempotency_history_apis_enabled {
        return Err(Problem::feature_disabled(
            "DPM_IDEMPOTENCY_HISTORY_APIS_DISABLED",
        ));
    }
    let history = state
        .store
        .list_idempotency_history(&key)
        .await
        .map_err(Problem::from_store)?;
    Ok(Json(history).into_response())
}
