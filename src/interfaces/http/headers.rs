//! Request header extraction.

use axum::http::HeaderMap;

use crate::application::engine::new_correlation_id;
use crate::application::simulation_service::RequestContext;

use super::problem::Problem;

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";
pub const CORRELATION_ID: &str = "x-correlation-id";
pub const POLICY_PACK_ID: &str = "x-policy-pack-id";
pub const TENANT_POLICY_PACK_ID: &str = "x-tenant-policy-pack-id";
pub const TENANT_ID: &str = "x-tenant-id";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Build the request context. A fresh correlation id is generated when the
/// header is absent.
pub fn request_context(
    headers: &HeaderMap,
    idempotency_required: bool,
) -> Result<RequestContext, Problem> {
    let idempotency_key = header_value(headers, IDEMPOTENCY_KEY);
    if idempotency_required && idempotency_key.is_none() {
        return Err(Problem::validation(
            "Missing required header: Idempotency-Key",
        ));
    }

    Ok(RequestContext {
        correlation_id: header_value(headers, CORRELATION_ID).unwrap_or_else(new_correlation_id),
        idempotency_key,
        policy_pack_id: header_value(headers, POLICY_PACK_ID),
        tenant_policy_pack_id: header_value(headers, TENANT_POLICY_PACK_ID),
        tenant_id: header_value(headers, TENANT_ID),
    })
}
