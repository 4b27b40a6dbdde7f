//! Metrics reporting for the extraction pipeline.
//!
//! The pipeline reports through the [`MetricsSink`] trait. Every method has a
//! no-op default, so a sink only overrides what it cares about and a pipeline
//! without a sink ([`NoopMetrics`]) behaves identically.
//!
//! [`PipelineMetrics`] is the in-process collector used by the binary. It keeps
//! counters in memory and renders them as JSON for the `/metrics` endpoint.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Receiver of pipeline measurements.
pub trait MetricsSink: Send + Sync {
    /// Time taken by one `operation` (e.g. `decode`, `extract`).
    fn observe_duration(&self, _operation: &str, _elapsed: Duration) {}

    /// Adjusts the number of currently running workers.
    fn add_active_workers(&self, _delta: i64) {}

    /// Counts one error of the given kind (`decode`, `read`, `write`).
    fn record_error(&self, _kind: &str) {}

    /// Capacity of a pipeline channel.
    fn set_channel_capacity(&self, _channel: &str, _capacity: usize) {}
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

#[derive(Debug, Default, Clone, Copy)]
struct DurationStats {
    count: u64,
    total: Duration,
    max: Duration,
}

#[derive(Default)]
struct MetricsInner {
    active_workers: AtomicI64,
    durations: Mutex<BTreeMap<String, DurationStats>>,
    errors: Mutex<BTreeMap<String, u64>>,
    channel_capacity: Mutex<BTreeMap<String, usize>>,
}

/// Thread-safe in-memory metrics collector.
///
/// Cloning is cheap; clones share the same counters.
#[derive(Clone, Default)]
pub struct PipelineMetrics {
    inner: Arc<MetricsInner>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_workers(&self) -> i64 {
        self.inner.active_workers.load(Ordering::SeqCst)
    }

    pub fn error_count(&self, kind: &str) -> u64 {
        let errors = self
            .inner
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        errors.get(kind).copied().unwrap_or(0)
    }

    /// Number of observations recorded for `operation`.
    pub fn duration_count(&self, operation: &str) -> u64 {
        let durations = self
            .inner
            .durations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        durations.get(operation).map_or(0, |stats| stats.count)
    }

    pub fn channel_capacity(&self, channel: &str) -> Option<usize> {
        let capacities = self
            .inner
            .channel_capacity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        capacities.get(channel).copied()
    }

    /// Renders all metrics as a JSON object.
    pub fn snapshot(&self) -> Value {
        let durations: Map<String, Value> = self
            .inner
            .durations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(operation, stats)| {
                (
                    operation.clone(),
                    json!({
                        "count": stats.count,
                        "sum_seconds": stats.total.as_secs_f64(),
                        "max_seconds": stats.max.as_secs_f64(),
                    }),
                )
            })
            .collect();

        let errors = self
            .inner
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let capacities = self
            .inner
            .channel_capacity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        json!({
            "active_workers": self.active_workers(),
            "processing_duration_seconds": durations,
            "processing_errors_total": errors,
            "channel_capacity": capacities,
        })
    }
}

impl MetricsSink for PipelineMetrics {
    fn observe_duration(&self, operation: &str, elapsed: Duration) {
        let mut durations = self
            .inner
            .durations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stats = durations.entry(operation.to_owned()).or_default();
        stats.count += 1;
        stats.total += elapsed;
        stats.max = stats.max.max(elapsed);
    }

    fn add_active_workers(&self, delta: i64) {
        self.inner.active_workers.fetch_add(delta, Ordering::SeqCst);
    }

    fn record_error(&self, kind: &str) {
        let mut errors = self
            .inner
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *errors.entry(kind.to_owned()).or_insert(0) += 1;
    }

    fn set_channel_capacity(&self, channel: &str, capacity: usize) {
        self.inner
            .channel_capacity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.to_owned(), capacity);
    }
}
