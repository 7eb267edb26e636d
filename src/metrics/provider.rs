//! Metrics provider seam.
//!
//! The streaming engine and the REST endpoints consume host telemetry
//! through this trait; the production implementation lives in
//! `metrics::system`. Tests substitute a canned provider.

use serde::Serialize;

use crate::error::DaemonResult;

/// One GPU as reported by the driver.
#[derive(Debug, Clone, Serialize)]
pub struct GpuSample {
    pub id: usize,
    pub name: String,
    /// Utilization percentage, 0-100.
    pub utilization: f64,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub temperature_c: f64,
    pub power_w: f64,
}

/// Monotonic byte counters and link attributes for one network interface.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkCounters {
    pub interface: String,
    /// Cumulative bytes received since boot (monotonic).
    pub bytes_received: u64,
    /// Cumulative bytes sent since boot (monotonic).
    pub bytes_sent: u64,
    pub is_up: bool,
    /// Link speed in Mbit/s; 0 when the driver does not report one.
    pub speed_mbps: u64,
    pub mtu: u64,
    /// Primary IPv4 address, when assigned.
    pub ipv4: Option<String>,
    /// Primary IPv6 address, when assigned.
    pub ipv6: Option<String>,
    pub mac: Option<String>,
}

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, Serialize)]
pub struct DiskSample {
    pub device: String,
    pub mount_point: String,
    pub filesystem: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub percent: f64,
}

/// Static host inventory summary.
#[derive(Debug, Clone, Serialize)]
pub struct HardwareSummary {
    pub hostname: String,
    pub os: String,
    pub os_version: String,
    pub kernel: String,
    pub arch: String,
    pub cpu_physical: usize,
    pub cpu_logical: usize,
    pub mem_total_gb: f64,
    pub mem_used_gb: f64,
    pub uptime_seconds: u64,
}

/// Source of instantaneous host metrics and counter readings.
///
/// Implementations may block (reading sysfs, querying the GPU driver);
/// async callers go through `spawn_blocking`.
pub trait MetricsProvider: Send + Sync {
    /// Overall CPU utilization percentage, 0-100.
    fn sample_cpu_percent(&self) -> DaemonResult<f64>;

    /// Physical memory utilization percentage, 0-100.
    fn sample_memory_percent(&self) -> DaemonResult<f64>;

    /// Per-GPU utilization and memory figures. Errors here are expected
    /// on hosts without a GPU driver and are absorbed by callers.
    fn sample_gpu_list(&self) -> DaemonResult<Vec<GpuSample>>;

    /// Per-interface byte counters and link attributes.
    fn sample_network_counters(&self) -> DaemonResult<Vec<NetworkCounters>>;

    /// Mounted filesystem usage.
    fn sample_disks(&self) -> DaemonResult<Vec<DiskSample>>;

    /// Host inventory summary.
    fn hardware_summary(&self) -> DaemonResult<HardwareSummary>;
}

/// Average utilization across all GPUs, 0 when none are visible.
pub fn gpu_average_utilization(gpus: &[GpuSample]) -> f64 {
    if gpus.is_empty() {
        return 0.0;
    }
    let sum: f64 = gpus.iter().map(|g| g.utilization).sum();
    let avg = sum / gpus.len() as f64;
    (avg * 10.0).round() / 10.0
}
