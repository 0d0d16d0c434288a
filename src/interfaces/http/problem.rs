//! Error envelopes.
//!
//! Non-domain failures leave the service as `application/problem+json`.
//! Domain outcomes never pass through here; they are 200s with a `status`
//! field in the body.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::simulation_service::ServiceError;
use crate::domain::errors::{PolicyError, StoreError, ValidationError, WorkflowError};

#[derive(Debug, Serialize)]
pub struct Problem {
    #[serde(skip)]
    pub status: StatusCode,
    pub title: String,
    pub detail: String,
    #[serde(rename = "status")]
    pub status_code: u16,
}

impl Problem {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            detail: detail.into(),
            status_code: status.as_u16(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "Validation failed", detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "Conflict", detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found", detail)
    }

    /// Stable feature-gate code, e.g. `DPM_WORKFLOW_DISABLED`.
    pub fn feature_disabled(code: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "Feature disabled", code)
    }

    pub fn backend_unavailable(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Backend not ready",
            detail,
        )
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error",
            detail,
        )
    }

    pub fn from_validation(err: ValidationError) -> Self {
        Self::validation(err.to_string())
    }

    pub fn from_store(err: StoreError) -> Self {
        match &err {
            StoreError::IdempotencyConflict { .. }
            | StoreError::DuplicateCorrelation { .. }
            | StoreError::OperationNotExecutable { .. } => Self::conflict(err.to_string()),
            StoreError::NotFound { .. } => Self::not_found(err.to_string()),
            StoreError::InvalidCursor => Self::validation(err.to_string()),
            StoreError::Backend { .. } => Self::backend_unavailable(err.to_string()),
            StoreError::MigrationChecksumMismatch { .. } | StoreError::Serialization(_) => {
                Self::internal(err.to_string())
            }
        }
    }

    pub fn from_workflow(err: WorkflowError) -> Self {
        match &err {
            WorkflowError::RunNotFound { .. } | WorkflowError::ProposalNotFound { .. } => {
                Self::not_found(err.to_string())
            }
            WorkflowError::InvalidTransition { .. } | WorkflowError::StateConflict { .. } => {
                Self::conflict(err.to_string())
            }
            WorkflowError::ReviewNotRequired { .. } => Self::validation(err.to_string()),
            WorkflowError::Store(inner_ref) => match inner_ref {
                StoreError::Backend { .. } => Self::backend_unavailable(err.to_string()),
                _ => Self::internal(err.to_string()),
            },
        }
    }

    pub fn from_policy(err: PolicyError) -> Self {
        Self::validation(err.to_string())
    }

    pub fn from_service(err: ServiceError) -> Self {
        match err {
            ServiceError::Policy(inner) => Self::from_policy(inner),
            ServiceError::Store(inner) => Self::from_store(inner),
            ServiceError::Canonical(inner) => Self::validation(inner.to_string()),
        }
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = self.status;
        let mut response = (status, Json(self)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_conflict_maps_to_409() {
        let problem = Problem::from_store(StoreError::IdempotencyConflict {
            key: "k".to_string(),
        });
        assert_eq!(problem.status, StatusCode::CONFLICT);
        assert!(problem.detail.contains("IDEMPOTENCY_KEY_CONFLICT"));
    }

    #[test]
    fn test_backend_maps_to_503() {
        let problem = Problem::from_store(StoreError::backend("connection refused"));
        assert_eq!(problem.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_feature_gate_maps_to_404() {
        let problem = Problem::feature_disabled("DPM_WORKFLOW_DISABLED");
        assert_eq!(problem.status, StatusCode::NOT_FOUND);
        assert_eq!(problem.detail, "DPM_WORKFLOW_DISABLED");
    }
}
