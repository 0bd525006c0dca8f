//! Metrics registry — latest gauge values and timing samples by name.
//!
//! Gauges are stored as the last value written. Timings keep a bounded
//! window of samples (microseconds) plus a running count, and are
//! summarised into P50/P99/max on read.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::trace;

/// Samples retained per timing metric before the oldest are dropped.
const MAX_SAMPLES: usize = 4096;

/// Destination for gauge and timing metrics.
///
/// Implementations must be cheap to call and safe to share across tasks.
pub trait MetricsSink: Send + Sync {
    /// Record the current value of a gauge.
    fn set_gauge(&self, name: &str, value: f64);

    /// Record one timing sample.
    fn add_sample(&self, name: &str, elapsed: Duration);

    /// Record the time elapsed since `start`.
    fn measure_since(&self, name: &str, start: Instant) {
        self.add_sample(name, start.elapsed());
    }
}

/// Read-side view of a timing metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSummary {
    /// Samples recorded since the registry was created.
    pub count: u64,
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Default)]
struct Timing {
    count: u64,
    /// Most recent samples in microseconds.
    samples: VecDeque<u64>,
}

#[derive(Default)]
struct Inner {
    gauges: BTreeMap<String, f64>,
    timings: BTreeMap<String, Timing>,
}

/// Thread-safe in-process metrics registry.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value of a gauge, if it has ever been set.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.gauges.get(name).copied()
    }

    /// Summary of a timing metric, if any sample has been recorded.
    pub fn timing(&self, name: &str) -> Option<TimingSummary> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.timings.get(name).map(summarise)
    }

    /// All gauges, sorted by name.
    pub fn gauges(&self) -> Vec<(String, f64)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.gauges.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// All timing summaries, sorted by name.
    pub fn timings(&self) -> Vec<(String, TimingSummary)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .timings
            .iter()
            .map(|(k, t)| (k.clone(), summarise(t)))
            .collect()
    }
}

impl MetricsSink for MetricsRegistry {
    fn set_gauge(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.gauges.insert(name.to_string(), value);
        trace!(metric = %name, value, "gauge set");
    }

    fn add_sample(&self, name: &str, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let timing = inner.timings.entry(name.to_string()).or_default();
        timing.count += 1;
        if timing.samples.len() == MAX_SAMPLES {
            timing.samples.pop_front();
        }
        timing.samples.push_back(micros);
    }
}

fn summarise(timing: &Timing) -> TimingSummary {
    let samples: Vec<u64> = timing.samples.iter().copied().collect();
    let (p50_ms, p99_ms) = compute_percentiles(&samples);
    let max_ms = samples.iter().max().copied().unwrap_or(0) as f64 / 1000.0;
    TimingSummary {
        count: timing.count,
        p50_ms,
        p99_ms,
        max_ms,
    }
}

/// Compute P50 and P99 from samples in microseconds.
///
/// Returns (p50_ms, p99_ms). If empty, returns (0.0, 0.0).
fn compute_percentiles(samples: &[u64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let p50_idx = (sorted.len() as f64 * 0.50) as usize;
    let p99_idx = (sorted.len() as f64 * 0.99) as usize;

    let p50 = sorted[p50_idx.min(sorted.len() - 1)] as f64 / 1000.0;
    let p99 = sorted[p99_idx.min(sorted.len() - 1)] as f64 / 1000.0;

    (p50, p99)
}
