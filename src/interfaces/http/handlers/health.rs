//! Liveness and metrics endpoints.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::super::state::AppState;

pub async fn health(State(state): State<AppState>) -> Response {
    let store_ready = state.store.ready().await.is_ok();
    let body = json!({
        "status": if store_ready { "ok" } else { "degraded" },
        "store_ready": store_ready,
        "version": env!("CARGO_PKG_VERSION"),
    });
    Json(body).into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    state.metrics.render().into_response()
}
