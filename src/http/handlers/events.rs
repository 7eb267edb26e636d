//! Live telemetry feed.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::http::state::AppState;

use super::authenticate;

/// `GET /events/metrics`
///
/// Opens a text event stream that pushes one metrics frame every cycle
/// (`data: <json>\n\n`). The stream has no event IDs and is not
/// resumable; it runs until the client disconnects or the daemon shuts
/// down. Dropping the response body cancels the producer immediately.
pub async fn metrics_events(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let claims = match authenticate(&state, &headers) {
        Ok(claims) => claims,
        Err(response) => return response,
    };

    let stream_metrics = state.streamer().metrics();
    let max_streams = state.settings().limits.max_concurrent_streams;
    if stream_metrics.active() >= max_streams {
        warn!(
            active = stream_metrics.active(),
            max = max_streams,
            "Stream limit reached, rejecting connection"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "too many open streams"})),
        )
            .into_response();
    }

    let handle = state.streamer().open(&claims.sub);

    // The handle travels inside the stream; when the client disconnects,
    // axum drops the body, the handle drops with it, and the producer
    // loop is cancelled without waiting out its sleep.
    let stream = futures_util::stream::unfold(handle, |mut handle| async move {
        let frame = handle.next_frame().await?;
        let event = match Event::default().json_data(&frame) {
            Ok(event) => event,
            // Serialization failure is unrecoverable for the stream.
            Err(e) => {
                warn!(error = %e, "Failed to encode metrics frame, closing stream");
                return None;
            }
        };
        Some((Ok::<_, Infallible>(event), handle))
    });

    Sse::new(stream).into_response()
}
