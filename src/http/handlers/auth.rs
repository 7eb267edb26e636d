//! Authentication endpoints: login, logout, identity.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::audit::AuditEntry;
use crate::auth::verify_login;
use crate::http::cookie::{clear_session_cookie, extract_session, session_cookie};
use crate::http::state::AppState;
use crate::validation::validate_username;

use super::{authenticate, internal_error, unauthorized};

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /api/auth/login`
///
/// Verifies the credentials and, on success, issues a session token in an
/// HTTP-only cookie. Every failure mode (unknown user, disabled account,
/// wrong password, malformed stored record) produces the same 401 with no
/// cookie.
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let username = req.username.trim().to_string();

    if username.is_empty() || req.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "error": "missing username or password"})),
        )
            .into_response();
    }

    if validate_username(&username).is_err() {
        audit_login_failure(&state, &username);
        return unauthorized();
    }

    // Key derivation is deliberately slow; keep it off the async workers.
    let store = state.store();
    let lookup_user = username.clone();
    let password = req.password;
    let verified = tokio::task::spawn_blocking(move || {
        verify_login(store.as_ref(), &lookup_user, &password)
    })
    .await;

    let user = match verified {
        Ok(Ok(user)) => user,
        Ok(Err(e)) => {
            warn!(username = %username, error = %e, "Login rejected");
            audit_login_failure(&state, &username);
            return unauthorized();
        }
        Err(e) => {
            error!(error = %e, "Credential verification task failed");
            return internal_error();
        }
    };

    let token = match state
        .codec()
        .issue(&user.username, &user.role, BTreeMap::new())
    {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "Failed to issue session token");
            return internal_error();
        }
    };

    info!(username = %user.username, role = %user.role, "Login succeeded");
    if let Some(audit) = state.audit() {
        audit.log_best_effort(&AuditEntry::success("auth.login", &user.username, "api"));
    }

    let cookie = session_cookie(&token, state.codec().ttl_seconds());
    let mut response = Json(json!({"ok": true})).into_response();
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode session cookie");
            internal_error()
        }
    }
}

/// `POST /api/auth/logout`
///
/// Clears the session cookie. Always succeeds; an unauthenticated logout
/// is a no-op rather than an error.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    // Best-effort attribution for the audit trail.
    if let Some(audit) = state.audit() {
        if let Some(claims) = extract_session(&headers)
            .and_then(|token| state.codec().verify(&token).ok())
        {
            audit.log_best_effort(&AuditEntry::success("auth.logout", &claims.sub, "api"));
        }
    }

    let mut response = Json(json!({"ok": true})).into_response();
    match HeaderValue::from_str(&clear_session_cookie()) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode clearing cookie");
            internal_error()
        }
    }
}

/// `GET /api/auth/me`
///
/// Returns the verified identity behind the session cookie.
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let claims = match authenticate(&state, &headers) {
        Ok(claims) => claims,
        Err(response) => return response,
    };

    Json(json!({
        "username": claims.sub,
        "role": claims.role,
    }))
    .into_response()
}

fn audit_login_failure(state: &AppState, username: &str) {
    if let Some(audit) = state.audit() {
        audit.log_best_effort(&AuditEntry::failure(
            "auth.login",
            username,
            "api",
            "invalid credentials",
        ));
    }
}
