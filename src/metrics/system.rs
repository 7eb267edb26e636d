//! Host metrics provider backed by `sysinfo` and Linux sysfs.

use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use sysinfo::{Disks, MacAddr, Networks, System};

use crate::error::DaemonResult;

use super::gpu::GpuSampler;
use super::provider::{
    DiskSample, GpuSample, HardwareSummary, MetricsProvider, NetworkCounters,
};

/// Production metrics provider.
///
/// CPU and memory sampling share one `sysinfo::System` behind a mutex;
/// network and disk enumerations build fresh snapshots per call, which is
/// cheap at dashboard cadence and avoids stale interface lists.
pub struct SystemMetricsProvider {
    system: Mutex<System>,
    gpu: GpuSampler,
}

impl SystemMetricsProvider {
    /// Create a provider. `gpu_timeout` bounds each driver query.
    pub fn new(gpu_timeout: Duration) -> Self {
        Self {
            system: Mutex::new(System::new_all()),
            gpu: GpuSampler::new(gpu_timeout),
        }
    }
}

impl MetricsProvider for SystemMetricsProvider {
    fn sample_cpu_percent(&self) -> DaemonResult<f64> {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_cpu_usage();
        Ok(round1(system.global_cpu_usage() as f64))
    }

    fn sample_memory_percent(&self) -> DaemonResult<f64> {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Ok(0.0);
        }
        Ok(round1(system.used_memory() as f64 / total as f64 * 100.0))
    }

    fn sample_gpu_list(&self) -> DaemonResult<Vec<GpuSample>> {
        self.gpu.sample()
    }

    fn sample_network_counters(&self) -> DaemonResult<Vec<NetworkCounters>> {
        let networks = Networks::new_with_refreshed_list();
        let mut out = Vec::new();

        for (name, data) in &networks {
            let addrs: Vec<IpAddr> = data.ip_networks().iter().map(|net| net.addr).collect();
            let (ipv4, ipv6) = primary_addresses(&addrs);

            let mac = data.mac_address();
            let mac = (mac != MacAddr::UNSPECIFIED).then(|| mac.to_string());

            out.push(NetworkCounters {
                interface: name.clone(),
                bytes_received: data.total_received(),
                bytes_sent: data.total_transmitted(),
                is_up: link_is_up(name),
                speed_mbps: link_speed_mbps(name),
                mtu: data.mtu(),
                ipv4,
                ipv6,
                mac,
            });
        }

        out.sort_by(|a, b| a.interface.cmp(&b.interface));
        Ok(out)
    }

    fn sample_disks(&self) -> DaemonResult<Vec<DiskSample>> {
        let disks = Disks::new_with_refreshed_list();
        let mut out = Vec::new();

        for disk in &disks {
            let total = disk.total_space();
            let used = total.saturating_sub(disk.available_space());
            let percent = if total > 0 {
                round1(used as f64 / total as f64 * 100.0)
            } else {
                0.0
            };

            out.push(DiskSample {
                device: disk.name().to_string_lossy().into_owned(),
                mount_point: disk.mount_point().to_string_lossy().into_owned(),
                filesystem: disk.file_system().to_string_lossy().into_owned(),
                total_gb: round2(bytes_to_gb(total)),
                used_gb: round2(bytes_to_gb(used)),
                percent,
            });
        }

        Ok(out)
    }

    fn hardware_summary(&self) -> DaemonResult<HardwareSummary> {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_memory();

        Ok(HardwareSummary {
            hostname: System::host_name().unwrap_or_else(|| "-".to_string()),
            os: System::name().unwrap_or_else(|| "-".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "-".to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| "-".to_string()),
            arch: std::env::consts::ARCH.to_string(),
            cpu_physical: System::physical_core_count().unwrap_or(0),
            cpu_logical: system.cpus().len(),
            mem_total_gb: round1(bytes_to_gb(system.total_memory())),
            mem_used_gb: round1(bytes_to_gb(system.used_memory())),
            uptime_seconds: System::uptime(),
        })
    }
}

/// Select the primary IPv4 and IPv6 addresses from an interface's address
/// list by explicit address-family match.
fn primary_addresses(addrs: &[IpAddr]) -> (Option<String>, Option<String>) {
    let ipv4 = addrs.iter().find_map(|addr| match addr {
        IpAddr::V4(v4) => Some(v4.to_string()),
        IpAddr::V6(_) => None,
    });
    let ipv6 = addrs.iter().find_map(|addr| match addr {
        IpAddr::V6(v6) => Some(v6.to_string()),
        IpAddr::V4(_) => None,
    });
    (ipv4, ipv6)
}

/// Link state from sysfs; interfaces without an operstate entry read as
/// down (containers, non-Linux builds).
fn link_is_up(interface: &str) -> bool {
    std::fs::read_to_string(format!("/sys/class/net/{}/operstate", interface))
        .map(|s| s.trim() == "up")
        .unwrap_or(false)
}

/// Link speed in Mbit/s from sysfs; virtual interfaces report -1 or
/// nothing, which reads as 0.
fn link_speed_mbps(interface: &str) -> u64 {
    std::fs::read_to_string(format!("/sys/class/net/{}/speed", interface))
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|speed| *speed > 0)
        .map(|speed| speed as u64)
        .unwrap_or(0)
}

fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0 / 1024.0
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
