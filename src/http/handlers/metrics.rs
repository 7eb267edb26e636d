//! Point-in-time metric endpoints.
//!
//! These return a single sample per request; the live feed lives in
//! `handlers::events`. Rates reported here go through the same shared
//! sampler as the streams, so both views agree on baselines.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use crate::metrics::{gpu_average_utilization, NetworkCounters};
use crate::http::state::AppState;

use super::{authenticate, internal_error};

/// `GET /api/metrics/system`
///
/// Headline gauges for the dashboard: CPU, memory, and average GPU
/// utilization. Unavailable sources read as zero.
pub async fn system(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let provider = state.provider();
    let sampled = tokio::task::spawn_blocking(move || {
        let cpu = provider.sample_cpu_percent().unwrap_or(0.0);
        let mem = provider.sample_memory_percent().unwrap_or(0.0);
        let gpus = provider.sample_gpu_list().unwrap_or_default();
        (cpu, mem, gpu_average_utilization(&gpus))
    })
    .await;

    match sampled {
        Ok((cpu, mem, gpu)) => Json(json!({"cpu": cpu, "mem": mem, "gpu": gpu})).into_response(),
        Err(e) => {
            error!(error = %e, "System metrics task failed");
            internal_error()
        }
    }
}

/// `GET /api/gpu`
///
/// Per-GPU telemetry. Hosts without a GPU driver report an empty list
/// rather than an error.
pub async fn gpu(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let provider = state.provider();
    let sampled = tokio::task::spawn_blocking(move || {
        provider.sample_gpu_list().unwrap_or_else(|e| {
            debug!(error = %e, "GPU query unavailable");
            Vec::new()
        })
    })
    .await;

    match sampled {
        Ok(gpus) => Json(gpus).into_response(),
        Err(e) => {
            error!(error = %e, "GPU metrics task failed");
            internal_error()
        }
    }
}

/// One interface with counters, link attributes, and derived rates.
#[derive(Debug, Serialize)]
struct InterfaceReport {
    #[serde(flatten)]
    counters: NetworkCounters,
    rx_rate_mbps: f64,
    tx_rate_mbps: f64,
}

/// `GET /api/network/interfaces`
///
/// Interface inventory plus current throughput.
pub async fn network_interfaces(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let provider = state.provider();
    let sampled =
        tokio::task::spawn_blocking(move || provider.sample_network_counters()).await;

    let counters = match sampled {
        Ok(Ok(counters)) => counters,
        Ok(Err(e)) => {
            debug!(error = %e, "Network counters unavailable");
            Vec::new()
        }
        Err(e) => {
            error!(error = %e, "Network metrics task failed");
            return internal_error();
        }
    };

    let rates = state
        .streamer()
        .sampler()
        .observe_interfaces(&counters, state.streamer().monotonic_secs());

    let report: Vec<InterfaceReport> = counters
        .into_iter()
        .map(|counters| {
            let rate = rates.get(&counters.interface).copied();
            InterfaceReport {
                rx_rate_mbps: rate.map(|r| r.rx_mbps).unwrap_or(0.0),
                tx_rate_mbps: rate.map(|r| r.tx_mbps).unwrap_or(0.0),
                counters,
            }
        })
        .collect();

    Json(report).into_response()
}

/// `GET /api/storage/disks`
///
/// Mounted filesystem usage.
pub async fn storage_disks(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let provider = state.provider();
    let sampled = tokio::task::spawn_blocking(move || provider.sample_disks()).await;

    match sampled {
        Ok(Ok(disks)) => Json(disks).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "Disk enumeration failed");
            internal_error()
        }
        Err(e) => {
            error!(error = %e, "Disk metrics task failed");
            internal_error()
        }
    }
}

/// `GET /api/hardware/summary`
///
/// Static host inventory.
pub async fn hardware_summary(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let provider = state.provider();
    let sampled = tokio::task::spawn_blocking(move || provider.hardware_summary()).await;

    match sampled {
        Ok(Ok(summary)) => Json(summary).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "Hardware summary failed");
            internal_error()
        }
        Err(e) => {
            error!(error = %e, "Hardware summary task failed");
            internal_error()
        }
    }
}
