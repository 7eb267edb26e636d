//! Host metric sampling and rate derivation.

mod gpu;
mod provider;
mod rate;
mod system;

pub use gpu::GpuSampler;
pub use provider::{
    gpu_average_utilization, DiskSample, GpuSample, HardwareSummary, MetricsProvider,
    NetworkCounters,
};
pub use rate::{InterfaceRate, RateSampler};
pub use system::SystemMetricsProvider;
