//! HTTP request handlers.

pub mod auth;
pub mod events;
pub mod metrics;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;

use crate::auth::TokenClaims;

use super::cookie::extract_session;
use super::state::AppState;

/// Resolve the caller's identity from the session cookie.
///
/// Missing cookie, malformed token, bad signature, and expired token all
/// collapse into the same 401 response; the distinction is logged
/// server-side only.
pub(crate) fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<TokenClaims, Response> {
    let token = extract_session(headers).ok_or_else(unauthorized)?;

    state.codec().verify(&token).map_err(|e| {
        debug!(error = %e, "Session token rejected");
        unauthorized()
    })
}

/// The undifferentiated 401 every authentication failure maps onto.
pub(crate) fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized"})),
    )
        .into_response()
}

/// Internal error response with no detail leakage.
pub(crate) fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal error"})),
    )
        .into_response()
}
