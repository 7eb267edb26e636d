//! Per-connection telemetry streaming.
//!
//! Each open connection gets one producer task that samples the metrics
//! provider, derives interface rates through the shared sampler, and
//! pushes a frame down an outbound channel every cycle. Within a
//! connection the cycle is strictly sequential (sample, emit, sleep);
//! connections run concurrently and never share frame ordering.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogger};
use crate::config::StreamConfig;
use crate::error::DaemonResult;
use crate::metrics::{gpu_average_utilization, MetricsProvider, RateSampler};

use super::frame::MetricsFrame;

/// Stream lifecycle counters for monitoring.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    /// Total streams opened since startup.
    pub opened_total: AtomicU64,
    /// Currently active streams.
    pub active_streams: AtomicUsize,
}

impl StreamMetrics {
    /// Create new stream metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stream opening.
    pub fn record_open(&self) {
        self.opened_total.fetch_add(1, Ordering::Relaxed);
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stream closing.
    pub fn record_close(&self) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get the active stream count.
    pub fn active(&self) -> usize {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Get the total opened stream count.
    pub fn opened(&self) -> u64 {
        self.opened_total.load(Ordering::Relaxed)
    }
}

/// Consumer half of one telemetry stream.
///
/// Dropping the handle (or calling [`close`](Self::close)) cancels the
/// producer immediately; it does not wait out the sampling interval.
pub struct StreamHandle {
    id: Uuid,
    rx: mpsc::Receiver<MetricsFrame>,
    cancel: Arc<Notify>,
}

impl StreamHandle {
    /// Stream identifier, for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receive the next frame. Returns `None` once the stream is closed
    /// and the channel has drained.
    pub async fn next_frame(&mut self) -> Option<MetricsFrame> {
        self.rx.recv().await
    }

    /// Cancel the producer loop.
    pub fn close(&self) {
        self.cancel.notify_one();
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.notify_one();
    }
}

/// Drives the per-connection telemetry loops.
///
/// One streamer is constructed per process; it owns the shared rate
/// sampler handle and the process shutdown signal so every open stream
/// tears down promptly on exit.
pub struct TelemetryStreamer {
    provider: Arc<dyn MetricsProvider>,
    sampler: Arc<RateSampler>,
    interval: Duration,
    channel_capacity: usize,
    shutdown: Arc<Notify>,
    metrics: Arc<StreamMetrics>,
    audit: Option<Arc<AuditLogger>>,
    started: Instant,
}

impl TelemetryStreamer {
    /// Create a streamer.
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        sampler: Arc<RateSampler>,
        config: &StreamConfig,
        shutdown: Arc<Notify>,
        audit: Option<Arc<AuditLogger>>,
    ) -> Self {
        Self {
            provider,
            sampler,
            interval: Duration::from_secs(config.interval_seconds),
            channel_capacity: config.channel_capacity.max(1),
            shutdown,
            metrics: Arc::new(StreamMetrics::new()),
            audit,
            started: Instant::now(),
        }
    }

    /// Get the stream lifecycle counters.
    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Monotonic seconds since the streamer was created; the time base
    /// for every rate observation.
    pub fn monotonic_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Get the shared rate sampler handle.
    pub fn sampler(&self) -> Arc<RateSampler> {
        Arc::clone(&self.sampler)
    }

    /// Open a telemetry stream for an already-authenticated identity.
    ///
    /// Authentication happens in the layer above; this method only wires
    /// the producer loop. The first frame is emitted immediately, then
    /// one per interval until the handle is dropped, the consumer stops
    /// reading, or the process shuts down.
    pub fn open(&self, identity: &str) -> StreamHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let cancel = Arc::new(Notify::new());

        self.metrics.record_open();
        info!(stream_id = %id, identity = %identity, "Telemetry stream opened");

        if let Some(audit) = &self.audit {
            audit.log_best_effort(&AuditEntry::success("stream.open", identity, "stream"));
        }

        tokio::spawn(run_stream(StreamContext {
            id,
            identity: identity.to_string(),
            provider: Arc::clone(&self.provider),
            sampler: Arc::clone(&self.sampler),
            started: self.started,
            interval: self.interval,
            tx,
            cancel: Arc::clone(&cancel),
            shutdown: Arc::clone(&self.shutdown),
            metrics: Arc::clone(&self.metrics),
            audit: self.audit.clone(),
        }));

        StreamHandle { id, rx, cancel }
    }

    /// Sample one frame outside any stream (shared with REST endpoints so
    /// streaming and point queries agree on rate baselines).
    pub async fn sample_once(&self) -> MetricsFrame {
        sample_frame(&self.provider, &self.sampler, self.started).await
    }
}

/// Everything one producer loop needs.
struct StreamContext {
    id: Uuid,
    identity: String,
    provider: Arc<dyn MetricsProvider>,
    sampler: Arc<RateSampler>,
    started: Instant,
    interval: Duration,
    tx: mpsc::Sender<MetricsFrame>,
    cancel: Arc<Notify>,
    shutdown: Arc<Notify>,
    metrics: Arc<StreamMetrics>,
    audit: Option<Arc<AuditLogger>>,
}

/// The per-connection producer loop.
///
/// Strictly sequential per cycle: sample, emit, sleep. The cancel and
/// shutdown signals are polled against the sleep AND win over a pending
/// tick, so teardown never waits out the interval. A failed send means
/// the consumer is gone; that is connection closure, not an error.
async fn run_stream(ctx: StreamContext) {
    let mut tick = tokio::time::interval(ctx.interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Pinned once so a signal arriving while a cycle is in flight is
    // still observed on the next loop iteration.
    let cancelled = ctx.cancel.notified();
    let shutdown = ctx.shutdown.notified();
    tokio::pin!(cancelled, shutdown);

    loop {
        tokio::select! {
            _ = &mut cancelled => {
                debug!(stream_id = %ctx.id, "Stream cancelled by consumer");
                break;
            }
            _ = &mut shutdown => {
                debug!(stream_id = %ctx.id, "Stream closed by shutdown");
                break;
            }
            _ = tick.tick() => {
                let frame = sample_frame(&ctx.provider, &ctx.sampler, ctx.started).await;
                if ctx.tx.send(frame).await.is_err() {
                    debug!(stream_id = %ctx.id, "Consumer disconnected");
                    break;
                }
            }
        }
    }

    ctx.metrics.record_close();
    info!(
        stream_id = %ctx.id,
        identity = %ctx.identity,
        "Telemetry stream closed"
    );

    if let Some(audit) = &ctx.audit {
        audit.log_best_effort(&AuditEntry::success("stream.close", &ctx.identity, "stream"));
    }
}

/// Sample every metric source and assemble one frame.
///
/// Individual source failures substitute neutral defaults (0 / empty)
/// and never abort the cycle. Sampling is blocking work (sysfs reads,
/// driver queries), so it runs on the blocking pool.
async fn sample_frame(
    provider: &Arc<dyn MetricsProvider>,
    sampler: &Arc<RateSampler>,
    started: Instant,
) -> MetricsFrame {
    let provider = Arc::clone(provider);
    let sampler = Arc::clone(sampler);

    let result = tokio::task::spawn_blocking(move || {
        let t_secs = started.elapsed().as_secs_f64();
        sample_frame_blocking(provider.as_ref(), &sampler, t_secs)
    })
    .await;

    match result {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Frame sampling task failed");
            MetricsFrame::empty()
        }
    }
}

fn sample_frame_blocking(
    provider: &dyn MetricsProvider,
    sampler: &RateSampler,
    t_secs: f64,
) -> MetricsFrame {
    let cpu_percent = absorb(provider.sample_cpu_percent(), "cpu", 0.0);
    let memory_percent = absorb(provider.sample_memory_percent(), "memory", 0.0);
    let gpus = absorb(provider.sample_gpu_list(), "gpu", Vec::new());
    let counters = absorb(provider.sample_network_counters(), "network", Vec::new());

    MetricsFrame {
        cpu_percent,
        gpu_percent: gpu_average_utilization(&gpus),
        memory_percent,
        net: sampler.observe_interfaces(&counters, t_secs),
    }
}

/// Substitute a neutral default when a single metric source fails.
fn absorb<T>(result: DaemonResult<T>, source: &str, default: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!(source = %source, error = %e, "Metric source unavailable, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DaemonError, MetricErrorKind};
    use crate::metrics::{
        DiskSample, GpuSample, HardwareSummary, NetworkCounters,
    };
    use std::sync::atomic::AtomicBool;
    use tokio::time::timeout;

    /// Canned provider; optionally fails individual sources.
    struct MockProvider {
        gpu_fails: AtomicBool,
        rx_counter: AtomicU64,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                gpu_fails: AtomicBool::new(false),
                rx_counter: AtomicU64::new(0),
            }
        }

        fn failing_gpu() -> Self {
            let p = Self::new();
            p.gpu_fails.store(true, Ordering::Relaxed);
            p
        }
    }

    impl MetricsProvider for MockProvider {
        fn sample_cpu_percent(&self) -> DaemonResult<f64> {
            Ok(12.5)
        }

        fn sample_memory_percent(&self) -> DaemonResult<f64> {
            Ok(48.0)
        }

        fn sample_gpu_list(&self) -> DaemonResult<Vec<GpuSample>> {
            if self.gpu_fails.load(Ordering::Relaxed) {
                return Err(DaemonError::Metric {
                    kind: MetricErrorKind::Unavailable {
                        src: "mock gpu".to_string(),
                    },
                });
            }
            Ok(vec![GpuSample {
                id: 0,
                name: "Mock GPU".to_string(),
                utilization: 80.0,
                memory_used_mb: 100.0,
                memory_total_mb: 1000.0,
                temperature_c: 50.0,
                power_w: 30.0,
            }])
        }

        fn sample_network_counters(&self) -> DaemonResult<Vec<NetworkCounters>> {
            // 250 kB more per sample: a visible, deterministic rate.
            let rx = self.rx_counter.fetch_add(250_000, Ordering::Relaxed);
            Ok(vec![NetworkCounters {
                interface: "eth0".to_string(),
                bytes_received: rx,
                bytes_sent: 0,
                is_up: true,
                speed_mbps: 1000,
                mtu: 1500,
                ipv4: Some("10.0.0.2".to_string()),
                ipv6: None,
                mac: None,
            }])
        }

        fn sample_disks(&self) -> DaemonResult<Vec<DiskSample>> {
            Ok(Vec::new())
        }

        fn hardware_summary(&self) -> DaemonResult<HardwareSummary> {
            Err(DaemonError::Metric {
                kind: MetricErrorKind::Unavailable {
                    src: "mock".to_string(),
                },
            })
        }
    }

    fn test_streamer(interval_seconds: u64) -> TelemetryStreamer {
        TelemetryStreamer::new(
            Arc::new(MockProvider::new()),
            Arc::new(RateSampler::new()),
            &StreamConfig {
                interval_seconds,
                channel_capacity: 8,
                baseline_ttl_seconds: 600,
            },
            Arc::new(Notify::new()),
            None,
        )
    }

    #[tokio::test]
    async fn test_stream_emits_frames_within_cadence_bound() {
        let streamer = test_streamer(2);
        let mut handle = streamer.open("alice");

        // Every frame must arrive within 2.5 seconds (2 s cadence plus
        // scheduling slack); the first arrives immediately.
        for _ in 0..2 {
            let frame = timeout(Duration::from_millis(2_500), handle.next_frame())
                .await
                .expect("frame overdue")
                .expect("stream ended early");
            assert_eq!(frame.cpu_percent, 12.5);
            assert_eq!(frame.memory_percent, 48.0);
            assert_eq!(frame.gpu_percent, 80.0);
        }

        handle.close();
    }

    #[tokio::test]
    async fn test_no_frames_after_close() {
        let streamer = test_streamer(2);
        let mut handle = streamer.open("alice");

        // Consume the immediate first frame, then close. The next tick is
        // two seconds out, so nothing can be in flight.
        assert!(handle.next_frame().await.is_some());
        handle.close();

        let next = timeout(Duration::from_millis(500), handle.next_frame())
            .await
            .expect("close should end the stream promptly");
        assert!(next.is_none());
        assert_eq!(streamer.metrics().active(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_streams() {
        let shutdown = Arc::new(Notify::new());
        let streamer = TelemetryStreamer::new(
            Arc::new(MockProvider::new()),
            Arc::new(RateSampler::new()),
            &StreamConfig::default(),
            Arc::clone(&shutdown),
            None,
        );

        let mut a = streamer.open("alice");
        let mut b = streamer.open("bob");
        assert!(a.next_frame().await.is_some());
        assert!(b.next_frame().await.is_some());
        assert_eq!(streamer.metrics().active(), 2);

        // Let both producers park in their select loops before signalling;
        // notify_waiters only wakes registered waiters.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.notify_waiters();

        let a_end = timeout(Duration::from_millis(500), a.next_frame()).await;
        let b_end = timeout(Duration::from_millis(500), b.next_frame()).await;
        assert_eq!(a_end.expect("alice stream should end"), None);
        assert_eq!(b_end.expect("bob stream should end"), None);
    }

    #[tokio::test]
    async fn test_gpu_failure_does_not_abort_cycle() {
        let streamer = TelemetryStreamer::new(
            Arc::new(MockProvider::failing_gpu()),
            Arc::new(RateSampler::new()),
            &StreamConfig {
                interval_seconds: 1,
                channel_capacity: 8,
                baseline_ttl_seconds: 600,
            },
            Arc::new(Notify::new()),
            None,
        );

        let mut handle = streamer.open("alice");
        let frame = handle.next_frame().await.unwrap();

        // GPU unavailable: neutral default, everything else sampled.
        assert_eq!(frame.gpu_percent, 0.0);
        assert_eq!(frame.cpu_percent, 12.5);
        assert!(frame.net.contains_key("eth0"));
    }

    #[tokio::test]
    async fn test_first_frame_rates_are_zero_then_positive() {
        let streamer = TelemetryStreamer::new(
            Arc::new(MockProvider::new()),
            Arc::new(RateSampler::new()),
            &StreamConfig {
                interval_seconds: 1,
                channel_capacity: 8,
                baseline_ttl_seconds: 600,
            },
            Arc::new(Notify::new()),
            None,
        );

        let mut handle = streamer.open("alice");

        let first = handle.next_frame().await.unwrap();
        assert_eq!(first.net["eth0"].rx_mbps, 0.0);

        let second = handle.next_frame().await.unwrap();
        assert!(second.net["eth0"].rx_mbps > 0.0);

        handle.close();
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_producer() {
        let streamer = test_streamer(2);
        let metrics = streamer.metrics();

        let mut handle = streamer.open("alice");
        assert!(handle.next_frame().await.is_some());
        drop(handle);

        // Producer notices the cancel signal without waiting for a tick.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(metrics.active(), 0);
    }

    #[tokio::test]
    async fn test_sample_once_agrees_with_streams() {
        let streamer = test_streamer(1);
        let frame = streamer.sample_once().await;
        assert_eq!(frame.cpu_percent, 12.5);
        // First observation of a source: baseline only.
        assert_eq!(frame.net["eth0"].rx_mbps, 0.0);
    }
}
