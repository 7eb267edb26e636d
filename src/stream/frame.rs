//! Telemetry frame assembly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DaemonResult;
use crate::metrics::InterfaceRate;

/// One pushed unit of telemetry: the instantaneous metric values for a
/// single sampling cycle. Frames are serialized, emitted, and discarded;
/// nothing is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsFrame {
    /// Overall CPU utilization, 0-100.
    pub cpu_percent: f64,
    /// Average GPU utilization across visible GPUs, 0 when none.
    pub gpu_percent: f64,
    /// Physical memory utilization, 0-100.
    pub memory_percent: f64,
    /// Per-interface throughput in Mbit/s, keyed by interface name.
    pub net: BTreeMap<String, InterfaceRate>,
}

impl MetricsFrame {
    /// A frame with every metric at its neutral default, used when a
    /// whole sampling cycle fails.
    pub fn empty() -> Self {
        Self {
            cpu_percent: 0.0,
            gpu_percent: 0.0,
            memory_percent: 0.0,
            net: BTreeMap::new(),
        }
    }

    /// Encode the frame as one text event stream record:
    /// `data: <json>\n\n`.
    pub fn to_sse(&self) -> DaemonResult<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
