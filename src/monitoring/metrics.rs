/*!
 * Metrics Collection
 * Lightweight named counters, gauges and latency histograms
 *
 * The scheduler feeds one wait and one run observation per executed task
 * when a collector is attached; scheduler snapshots can be mirrored into
 * gauges for export.
 */

use crate::core::limits::LATENCY_BUCKETS;
use crate::core::serde::is_zero_u64;
use crate::core::types::Priority;
use crate::scheduler::MetricsSnapshot;
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Histogram data structure
#[derive(Debug, Clone)]
struct Histogram {
    buckets: &'static [f64],
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new(buckets: &'static [f64]) -> Self {
        Self {
            buckets,
            counts: vec![0; buckets.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;

        for (i, &bucket) in self.buckets.iter().enumerate() {
            if value <= bucket {
                self.counts[i] += 1;
            }
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }

        let target = (self.count as f64 * p).ceil() as u64;
        for (i, &count) in self.counts.iter().enumerate() {
            if count >= target {
                return self.buckets[i];
            }
        }
        self.buckets.last().copied().unwrap_or(0.0)
    }

    fn stats(&self) -> HistogramStats {
        HistogramStats {
            count: self.count,
            sum: self.sum,
            avg: if self.count > 0 {
                self.sum / self.count as f64
            } else {
                0.0
            },
            p50: self.percentile(0.50),
            p95: self.percentile(0.95),
            p99: self.percentile(0.99),
        }
    }
}

/// Metric names for one priority class
struct ClassMetrics {
    executed: &'static str,
    failed: &'static str,
    wait: &'static str,
    run: &'static str,
}

const IMMEDIATE_METRICS: ClassMetrics = ClassMetrics {
    executed: "tasks.immediate.executed",
    failed: "tasks.immediate.failed",
    wait: "tasks.immediate.wait_seconds",
    run: "tasks.immediate.run_seconds",
};

const DEFERRED_METRICS: ClassMetrics = ClassMetrics {
    executed: "tasks.deferred.executed",
    failed: "tasks.deferred.failed",
    wait: "tasks.deferred.wait_seconds",
    run: "tasks.deferred.run_seconds",
};

#[inline]
fn class_metrics(priority: Priority) -> &'static ClassMetrics {
    match priority {
        Priority::Immediate => &IMMEDIATE_METRICS,
        Priority::Deferred => &DEFERRED_METRICS,
    }
}

/// Metrics collector
///
/// # Performance
/// - Cache-line aligned to prevent false sharing in high-frequency metric updates
#[repr(C, align(64))]
pub struct MetricsCollector {
    counters: Arc<DashMap<String, f64, RandomState>>,
    gauges: Arc<DashMap<String, f64, RandomState>>,
    histograms: Arc<DashMap<String, Histogram, RandomState>>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(DashMap::with_hasher(RandomState::new())),
            gauges: Arc::new(DashMap::with_hasher(RandomState::new())),
            histograms: Arc::new(DashMap::with_hasher(RandomState::new())),
            start_time: Instant::now(),
        }
    }

    /// Increment a counter
    pub fn inc_counter(&self, name: &str, value: f64) {
        if let Some(mut entry) = self.counters.get_mut(name) {
            *entry += value;
            return;
        }
        self.counters
            .entry(name.to_string())
            .and_modify(|v| *v += value)
            .or_insert(value);
    }

    /// Set a gauge value
    pub fn set_gauge(&self, name: &str, value: f64) {
        self.gauges.insert(name.to_string(), value);
    }

    /// Observe a value (seconds) in a latency histogram
    pub fn observe_histogram(&self, name: &str, value: f64) {
        if let Some(mut hist) = self.histograms.get_mut(name) {
            hist.observe(value);
            return;
        }
        self.histograms
            .entry(name.to_string())
            .and_modify(|hist| hist.observe(value))
            .or_insert_with(|| {
                let mut hist = Histogram::new(&LATENCY_BUCKETS);
                hist.observe(value);
                hist
            });
    }

    /// Record operation duration
    pub fn record_duration(&self, name: &str, duration: Duration) {
        self.observe_histogram(name, duration.as_secs_f64());
    }

    /// Record one executed task: time spent queued and time spent running
    pub fn record_task(&self, priority: Priority, wait: Duration, run: Duration, failed: bool) {
        let names = class_metrics(priority);
        self.inc_counter(names.executed, 1.0);
        if failed {
            self.inc_counter(names.failed, 1.0);
        }
        self.record_duration(names.wait, wait);
        self.record_duration(names.run, run);
    }

    /// Mirror a scheduler snapshot into gauges
    pub fn record_snapshot(&self, snapshot: &MetricsSnapshot) {
        self.set_gauge("queue.immediate.depth", snapshot.immediate_queue_depth as f64);
        self.set_gauge("queue.deferred.depth", snapshot.deferred_queue_depth as f64);
        self.set_gauge(
            "loop.ticks_since_last_deferred_run",
            snapshot.ticks_since_last_deferred_run as f64,
        );
        self.set_gauge(
            "loop.starvation_seconds",
            Duration::from_micros(snapshot.starvation_micros).as_secs_f64(),
        );
        self.set_gauge("loop.forced_yields", snapshot.forced_yields as f64);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> CollectorSnapshot {
        let counters: HashMap<String, f64> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let gauges: HashMap<String, f64> = self
            .gauges
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let histograms: HashMap<String, HistogramStats> = self
            .histograms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect();

        CollectorSnapshot {
            counters,
            gauges,
            histograms,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Histogram statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistogramStats {
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Snapshot of all collected metrics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CollectorSnapshot {
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub counters: HashMap<String, f64>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub gauges: HashMap<String, f64>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub histograms: HashMap<String, HistogramStats>,
    pub uptime_secs: u64,
}
