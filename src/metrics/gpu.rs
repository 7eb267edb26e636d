//! GPU telemetry via `nvidia-smi`.
//!
//! The driver is queried through the CLI in CSV mode with a hard timeout,
//! so a wedged driver cannot stall a sampling cycle. Hosts without the
//! tool simply report no GPUs.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{DaemonError, MetricErrorKind};

use super::provider::GpuSample;

/// Fields requested from the driver, in output order.
const QUERY_FIELDS: &str = "name,utilization.gpu,temperature.gpu,power.draw,memory.used,memory.total";

/// Timeout-bounded `nvidia-smi` sampler.
pub struct GpuSampler {
    timeout: Duration,
}

impl GpuSampler {
    /// Create a sampler with the given query timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Query the driver. Any failure (missing binary, timeout, non-zero
    /// exit, unparsable output) is a `MetricUnavailable` error; callers
    /// decide whether to absorb it.
    pub fn sample(&self) -> Result<Vec<GpuSample>, DaemonError> {
        let mut cmd = Command::new("nvidia-smi");
        cmd.arg(format!("--query-gpu={}", QUERY_FIELDS))
            .arg("--format=csv,noheader,nounits");

        let output = run_with_timeout(cmd, self.timeout)?;
        if !output.status.success() {
            return Err(unavailable(format!(
                "nvidia-smi exited with status {:?}",
                output.status.code()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_csv(&stdout))
    }
}

fn unavailable(message: String) -> DaemonError {
    debug!(message = %message, "GPU query unavailable");
    DaemonError::Metric {
        kind: MetricErrorKind::Unavailable { src: message },
    }
}

/// Run a command, killing it if it exceeds `timeout`.
fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
) -> Result<std::process::Output, DaemonError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| unavailable(format!("Failed to spawn nvidia-smi: {}", e)))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => {
                return child
                    .wait_with_output()
                    .map_err(|e| unavailable(format!("Failed to collect output: {}", e)));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(unavailable(format!(
                        "nvidia-smi timed out after {}s",
                        timeout.as_secs()
                    )));
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => return Err(unavailable(format!("Failed to poll nvidia-smi: {}", e))),
        }
    }
}

/// Parse `csv,noheader,nounits` output, one GPU per line.
///
/// Malformed lines are skipped rather than failing the whole sample;
/// missing numeric fields read as zero.
fn parse_csv(output: &str) -> Vec<GpuSample> {
    let mut gpus = Vec::new();
    for line in output.lines() {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 6 {
            continue;
        }
        gpus.push(GpuSample {
            id: gpus.len(),
            name: parts[0].to_string(),
            utilization: parts[1].parse().unwrap_or(0.0),
            temperature_c: parts[2].parse().unwrap_or(0.0),
            power_w: parts[3].parse().unwrap_or(0.0),
            memory_used_mb: parts[4].parse().unwrap_or(0.0),
            memory_total_mb: parts[5].parse().unwrap_or(0.0),
        });
    }
    gpus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_gpu() {
        let output = "NVIDIA GeForce RTX 4090, 37, 54, 128.50, 8192, 24564\n";
        let gpus = parse_csv(output);
        assert_eq!(gpus.len(), 1);

        let gpu = &gpus[0];
        assert_eq!(gpu.id, 0);
        assert_eq!(gpu.name, "NVIDIA GeForce RTX 4090");
        assert_eq!(gpu.utilization, 37.0);
        assert_eq!(gpu.temperature_c, 54.0);
        assert_eq!(gpu.power_w, 128.5);
        assert_eq!(gpu.memory_used_mb, 8192.0);
        assert_eq!(gpu.memory_total_mb, 24564.0);
    }

    #[test]
    fn test_parse_multiple_gpus_assigns_ids() {
        let output = "\
            NVIDIA A100, 90, 61, 300.00, 40000, 40960\n\
            NVIDIA A100, 12, 44, 80.00, 1000, 40960\n";
        let gpus = parse_csv(output);
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].id, 0);
        assert_eq!(gpus[1].id, 1);
        assert_eq!(gpus[1].utilization, 12.0);
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let output = "garbage line\nNVIDIA T4, 5, 40, 30.00, 512, 15360\n";
        let gpus = parse_csv(output);
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].name, "NVIDIA T4");
    }

    #[test]
    fn test_parse_unreadable_fields_default_to_zero() {
        let output = "NVIDIA T4, [N/A], 40, [N/A], 512, 15360\n";
        let gpus = parse_csv(output);
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].utilization, 0.0);
        assert_eq!(gpus[0].power_w, 0.0);
        assert_eq!(gpus[0].temperature_c, 40.0);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let sampler = GpuSampler::new(Duration::from_secs(1));
        // Only meaningful on hosts without the NVIDIA stack, which is the
        // common case for CI; on a GPU host the sample simply succeeds.
        if let Err(e) = sampler.sample() {
            assert!(matches!(
                e,
                DaemonError::Metric {
                    kind: MetricErrorKind::Unavailable { .. }
                }
            ));
        }
    }
}
