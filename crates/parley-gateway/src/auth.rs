//! Optional bearer token guard for the `/api` routes

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::protocol::ErrorBody;
use crate::server::GatewayState;

/// Reject requests without the configured token. No token configured means open access.
pub async fn require_token(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    if is_authorized(state.auth_token.as_deref(), request.headers()) {
        return next.run(request).await;
    }
    warn!("Rejected {} {}: missing or invalid token", request.method(), request.uri().path());
    (StatusCode::UNAUTHORIZED, axum::Json(ErrorBody::new("Unauthorized"))).into_response()
}

pub fn is_authorized(configured: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = configured.filter(|t| !t.is_empty()) else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .is_some_and(|provided| constant_time_eq(expected.as_bytes(), provided.as_bytes()))
}

/// `Bearer <token>` → `<token>`
pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    let token = header_value.trim().strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
