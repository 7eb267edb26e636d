//! Axum router wiring.

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::state::AppState;

/// Build the daemon's HTTP router.
///
/// Page rendering and static assets are served elsewhere; this process
/// only exposes the JSON API and the live event stream.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/metrics/system", get(handlers::metrics::system))
        .route("/api/gpu", get(handlers::metrics::gpu))
        .route(
            "/api/network/interfaces",
            get(handlers::metrics::network_interfaces),
        )
        .route("/api/storage/disks", get(handlers::metrics::storage_disks))
        .route(
            "/api/hardware/summary",
            get(handlers::metrics::hardware_summary),
        )
        .route("/events/metrics", get(handlers::events::metrics_events))
        .with_state(state)
}
