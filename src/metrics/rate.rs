//! Counter-to-rate conversion.
//!
//! Network byte counters are monotonic totals; the dashboard wants
//! point-in-time throughput. The sampler keeps one baseline (last counter
//! value and timestamp) per source key and turns each new observation into
//! a rate. One sampler is constructed per process and shared by handle
//! across every stream and REST endpoint, so all readers agree on the
//! baselines.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::provider::NetworkCounters;

/// Per-source baseline: the last accepted observation.
#[derive(Debug, Clone)]
struct Baseline {
    counter: u64,
    t_secs: f64,
    last_rate: f64,
    seen_at: Instant,
}

/// Receive/transmit rates for one interface, in Mbit/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterfaceRate {
    pub rx_mbps: f64,
    pub tx_mbps: f64,
}

/// Thread-safe rate sampler over monotonic counters.
pub struct RateSampler {
    baselines: Mutex<HashMap<String, Baseline>>,
}

impl RateSampler {
    /// Create an empty sampler.
    pub fn new() -> Self {
        Self {
            baselines: Mutex::new(HashMap::new()),
        }
    }

    /// Convert one counter observation into a rate (counter units/second).
    ///
    /// - First observation of a key stores the baseline and returns `0`.
    /// - `dt <= 0` returns the last known rate without touching the
    ///   baseline (timestamps must strictly increase per key).
    /// - A counter lower than the baseline means the source reset
    ///   (interface replaced, counter wrapped): re-baseline, return `0`.
    /// - Otherwise the rate is `delta / dt` and the baseline advances.
    ///
    /// The returned rate is never negative. Callers scale units
    /// (bytes/s to Mbit/s and the like).
    pub fn observe(&self, key: &str, counter: u64, t_secs: f64) -> f64 {
        let mut baselines = self.baselines.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let baseline = match baselines.entry(key.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(Baseline {
                    counter,
                    t_secs,
                    last_rate: 0.0,
                    seen_at: now,
                });
                return 0.0;
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };

        let dt = t_secs - baseline.t_secs;
        if dt <= 0.0 {
            // Clock or counter-read jitter; keep the previous answer.
            return baseline.last_rate;
        }

        if counter < baseline.counter {
            debug!(key = %key, "Counter reset detected, re-baselining");
            *baseline = Baseline {
                counter,
                t_secs,
                last_rate: 0.0,
                seen_at: now,
            };
            return 0.0;
        }

        let rate = (counter - baseline.counter) as f64 / dt;
        *baseline = Baseline {
            counter,
            t_secs,
            last_rate: rate,
            seen_at: now,
        };
        rate
    }

    /// Observe the rx/tx counters of a set of interfaces and return their
    /// rates in Mbit/s, keyed by interface name.
    pub fn observe_interfaces(
        &self,
        counters: &[NetworkCounters],
        t_secs: f64,
    ) -> BTreeMap<String, InterfaceRate> {
        counters
            .iter()
            .map(|nic| {
                let rx = self.observe(&format!("{}:rx", nic.interface), nic.bytes_received, t_secs);
                let tx = self.observe(&format!("{}:tx", nic.interface), nic.bytes_sent, t_secs);
                (
                    nic.interface.clone(),
                    InterfaceRate {
                        rx_mbps: bytes_per_sec_to_mbps(rx),
                        tx_mbps: bytes_per_sec_to_mbps(tx),
                    },
                )
            })
            .collect()
    }

    /// Number of tracked baselines (for monitoring).
    pub fn len(&self) -> usize {
        self.baselines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// True when no baselines are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict baselines that have not been observed within `max_age`.
    ///
    /// Sources that disappear (an interface removed from the host) would
    /// otherwise pin their baselines for the process lifetime.
    pub fn cleanup(&self, max_age: Duration) {
        let mut baselines = self.baselines.lock().unwrap_or_else(|e| e.into_inner());
        baselines.retain(|_, b| b.seen_at.elapsed() <= max_age);
    }

    /// Start a background task that periodically evicts stale baselines.
    pub fn start_cleanup_task(self: &std::sync::Arc<Self>, interval: Duration, max_age: Duration) {
        let sampler = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                sampler.cleanup(max_age);
            }
        });
    }
}

impl Default for RateSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Scale a bytes/second rate to Mbit/s, rounded to one decimal.
fn bytes_per_sec_to_mbps(rate: f64) -> f64 {
    (rate * 8.0 / 1_000_000.0 * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_zero() {
        let sampler = RateSampler::new();
        assert_eq!(sampler.observe("eth0", 100, 0.0), 0.0);
        assert_eq!(sampler.len(), 1);
    }

    #[test]
    fn test_baseline_delta_and_reset_sequence() {
        let sampler = RateSampler::new();
        // First observation: baseline, rate 0.
        assert_eq!(sampler.observe("eth0", 100, 0.0), 0.0);
        // Normal delta: 50 units over 1 second.
        assert_eq!(sampler.observe("eth0", 150, 1.0), 50.0);
        // Counter went backwards: reset, rate 0 rather than negative.
        assert_eq!(sampler.observe("eth0", 130, 2.0), 0.0);
        // Recovery from the new baseline.
        assert_eq!(sampler.observe("eth0", 230, 4.0), 50.0);
    }

    #[test]
    fn test_non_advancing_time_returns_last_rate() {
        let sampler = RateSampler::new();
        sampler.observe("eth0", 100, 0.0);
        assert_eq!(sampler.observe("eth0", 200, 1.0), 100.0);

        // Same timestamp: last rate, baseline untouched.
        assert_eq!(sampler.observe("eth0", 500, 1.0), 100.0);
        // Time going backwards: same answer.
        assert_eq!(sampler.observe("eth0", 500, 0.5), 100.0);
        // Baseline still at (200, t=1): next valid observation uses it.
        assert_eq!(sampler.observe("eth0", 300, 2.0), 100.0);
    }

    #[test]
    fn test_keys_are_isolated() {
        let sampler = RateSampler::new();
        sampler.observe("eth0", 1_000, 0.0);
        sampler.observe("wlan0", 0, 0.0);

        // Interleaved observations never influence each other.
        assert_eq!(sampler.observe("eth0", 1_100, 1.0), 100.0);
        assert_eq!(sampler.observe("wlan0", 10, 1.0), 10.0);
        assert_eq!(sampler.observe("eth0", 1_200, 2.0), 100.0);
        assert_eq!(sampler.observe("wlan0", 20, 2.0), 10.0);
    }

    #[test]
    fn test_rate_is_never_negative() {
        let sampler = RateSampler::new();
        sampler.observe("eth0", u64::MAX, 0.0);
        assert_eq!(sampler.observe("eth0", 0, 1.0), 0.0);
    }

    #[test]
    fn test_fractional_interval() {
        let sampler = RateSampler::new();
        sampler.observe("eth0", 0, 0.0);
        assert_eq!(sampler.observe("eth0", 50, 0.5), 100.0);
    }

    #[test]
    fn test_observe_interfaces_scales_to_mbps() {
        let sampler = RateSampler::new();
        let counters = vec![NetworkCounters {
            interface: "eth0".to_string(),
            bytes_received: 0,
            bytes_sent: 0,
            is_up: true,
            speed_mbps: 1000,
            mtu: 1500,
            ipv4: None,
            ipv6: None,
            mac: None,
        }];

        let rates = sampler.observe_interfaces(&counters, 0.0);
        assert_eq!(rates["eth0"].rx_mbps, 0.0);

        // 1,250,000 bytes in 1 s = 10 Mbit/s.
        let counters = vec![NetworkCounters {
            bytes_received: 1_250_000,
            bytes_sent: 625_000,
            ..counters[0].clone()
        }];
        let rates = sampler.observe_interfaces(&counters, 1.0);
        assert_eq!(rates["eth0"].rx_mbps, 10.0);
        assert_eq!(rates["eth0"].tx_mbps, 5.0);
    }

    #[test]
    fn test_cleanup_evicts_stale_baselines() {
        let sampler = RateSampler::new();
        sampler.observe("eth0", 100, 0.0);
        assert_eq!(sampler.len(), 1);

        // Nothing is stale yet.
        sampler.cleanup(Duration::from_secs(60));
        assert_eq!(sampler.len(), 1);

        // Everything is stale with a zero TTL.
        sampler.cleanup(Duration::ZERO);
        assert!(sampler.is_empty());
    }
}
