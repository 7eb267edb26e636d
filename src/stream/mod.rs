//! Live telemetry streaming.

mod frame;
mod streamer;

pub use frame::MetricsFrame;
pub use streamer::{StreamHandle, StreamMetrics, TelemetryStreamer};
