//! Process-wide metrics collection: an atomic
//! counters struct updated inline from the transport and land-manager code,
//! snapshotted on demand for the `/metrics` and `/metrics/prom` endpoints.
//! No admin HTTP surface beyond those two read-only endpoints -- that is
//! explicitly out of scope.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Atomic counters updated directly by `websocket::` and `land::` code.
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection metrics
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    pub disconnections: AtomicU64,
    pub connection_errors: AtomicU64,
    pub websocket_messages_dropped: AtomicU64,

    // Land lifecycle metrics
    pub lands_created: AtomicU64,
    pub lands_removed: AtomicU64,
    pub land_creation_failures: AtomicU64,

    // Join outcomes
    pub join_successes: AtomicU64,
    pub join_failures: AtomicU64,
    pub join_failures_room_not_found: AtomicU64,
    pub join_failures_duplicate_login: AtomicU64,

    // Sync cycle performance
    pub sync_cycles: AtomicU64,
    pub sync_cycle_latency: Arc<RwLock<ResponseTimeTracker>>,
    pub latency_histogram_clamped_samples: AtomicU64,

    // Parallel encoding / dynamic-key dictionary
    pub parallel_encode_workers_spawned: AtomicU64,
    pub dynamic_key_dictionary_entries: AtomicU64,

    // Error tracking
    pub validation_errors: AtomicU64,
    pub internal_errors: AtomicU64,
    pub websocket_errors: AtomicU64,

    /// Per-land-type adaptive dirty-tracking EMA, keyed by land type.
    dirty_tracking_ema: RwLock<HashMap<String, f64>>,
}

#[derive(Debug, Clone)]
pub struct ResponseTimeTracker {
    operations: HashMap<String, OperationLatencyHistogram>,
    lowest_discernible_micros: u64,
    highest_trackable_micros: u64,
    significant_figures: u8,
}

const DEFAULT_LOWEST_DISCERNIBLE_MICROS: u64 = 1;
const DEFAULT_HIGHEST_TRACKABLE_MICROS: u64 = 300_000_000; // 5 minutes in microseconds
const DEFAULT_SIGNIFICANT_FIGURES: u8 = 3;

#[derive(Debug, Clone)]
struct OperationLatencyHistogram {
    /// `None` if all creation attempts failed (should be rare)
    histogram: Option<Histogram<u64>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub connections: ConnectionMetrics,
    pub lands: LandMetrics,
    pub joins: JoinMetrics,
    pub sync: SyncMetrics,
    pub errors: ErrorMetrics,
    pub dirty_tracking_ema: HashMap<String, f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionMetrics {
    pub total_connections: u64,
    pub active_connections: u64,
    pub disconnections: u64,
    pub connection_errors: u64,
    pub websocket_messages_dropped: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LandMetrics {
    pub lands_created: u64,
    pub lands_removed: u64,
    pub land_creation_failures: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JoinMetrics {
    pub join_successes: u64,
    pub join_failures: u64,
    pub join_failures_room_not_found: u64,
    pub join_failures_duplicate_login: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncMetrics {
    pub sync_cycles: u64,
    pub sync_cycle_latency: OperationLatencyMetrics,
    pub latency_histogram_clamped_samples: u64,
    pub parallel_encode_workers_spawned: u64,
    pub dynamic_key_dictionary_entries: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct OperationLatencyMetrics {
    pub average_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub sample_count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorMetrics {
    pub validation_errors: u64,
    pub internal_errors: u64,
    pub websocket_errors: u64,
    pub total_errors: u64,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            disconnections: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            websocket_messages_dropped: AtomicU64::new(0),
            lands_created: AtomicU64::new(0),
            lands_removed: AtomicU64::new(0),
            land_creation_failures: AtomicU64::new(0),
            join_successes: AtomicU64::new(0),
            join_failures: AtomicU64::new(0),
            join_failures_room_not_found: AtomicU64::new(0),
            join_failures_duplicate_login: AtomicU64::new(0),
            sync_cycles: AtomicU64::new(0),
            sync_cycle_latency: Arc::new(RwLock::new(ResponseTimeTracker::new())),
            latency_histogram_clamped_samples: AtomicU64::new(0),
            parallel_encode_workers_spawned: AtomicU64::new(0),
            dynamic_key_dictionary_entries: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
            websocket_errors: AtomicU64::new(0),
            dirty_tracking_ema: RwLock::new(HashMap::new()),
        }
    }

    pub fn increment_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active_connections(&self) {
        let _ =
            self.active_connections
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                    if current > 0 {
                        Some(current - 1)
                    } else {
                        None
                    }
                });
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_connection_errors(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_websocket_messages_dropped(&self) {
        self.websocket_messages_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lands_created(&self) {
        self.lands_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lands_removed(&self) {
        self.lands_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_land_creation_failures(&self) {
        self.land_creation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_join_successes(&self) {
        self.join_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_join_failures_room_not_found(&self) {
        self.join_failures.fetch_add(1, Ordering::Relaxed);
        self.join_failures_room_not_found
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_join_failures_duplicate_login(&self) {
        self.join_failures.fetch_add(1, Ordering::Relaxed);
        self.join_failures_duplicate_login
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_join_failures_other(&self) {
        self.join_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validation_errors(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_internal_errors(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_websocket_errors(&self) {
        self.websocket_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parallel_encode_workers(&self, count: u64) {
        self.parallel_encode_workers_spawned
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_dynamic_key_dictionary_entries(&self, count: u64) {
        self.dynamic_key_dictionary_entries
            .store(count, Ordering::Relaxed);
    }

    /// Records the duration of one land's sync cycle.
    pub async fn record_sync_cycle(&self, land_type: &str, duration: Duration) {
        self.sync_cycles.fetch_add(1, Ordering::Relaxed);
        let clamped = self
            .sync_cycle_latency
            .write()
            .await
            .add_sample(land_type, duration);
        if clamped {
            self.latency_histogram_clamped_samples
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records the current dirty-tracking EMA value for a land type.
    pub async fn record_dirty_tracking_ema(&self, land_type: &str, ema: f64) {
        self.dirty_tracking_ema
            .write()
            .await
            .insert(land_type.to_string(), ema);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let tracker = self.sync_cycle_latency.read().await;
        let sync_cycle_latency = tracker
            .aggregate_metrics()
            .unwrap_or_default();
        let dirty_tracking_ema = self.dirty_tracking_ema.read().await.clone();

        let total_errors = self.validation_errors.load(Ordering::Relaxed)
            + self.internal_errors.load(Ordering::Relaxed)
            + self.websocket_errors.load(Ordering::Relaxed);

        MetricsSnapshot {
            timestamp: chrono::Utc::now(),
            connections: ConnectionMetrics {
                total_connections: self.total_connections.load(Ordering::Relaxed),
                active_connections: self.active_connections.load(Ordering::Relaxed),
                disconnections: self.disconnections.load(Ordering::Relaxed),
                connection_errors: self.connection_errors.load(Ordering::Relaxed),
                websocket_messages_dropped: self
                    .websocket_messages_dropped
                    .load(Ordering::Relaxed),
            },
            lands: LandMetrics {
                lands_created: self.lands_created.load(Ordering::Relaxed),
                lands_removed: self.lands_removed.load(Ordering::Relaxed),
                land_creation_failures: self.land_creation_failures.load(Ordering::Relaxed),
            },
            joins: JoinMetrics {
                join_successes: self.join_successes.load(Ordering::Relaxed),
                join_failures: self.join_failures.load(Ordering::Relaxed),
                join_failures_room_not_found: self
                    .join_failures_room_not_found
                    .load(Ordering::Relaxed),
                join_failures_duplicate_login: self
                    .join_failures_duplicate_login
                    .load(Ordering::Relaxed),
            },
            sync: SyncMetrics {
                sync_cycles: self.sync_cycles.load(Ordering::Relaxed),
                sync_cycle_latency,
                latency_histogram_clamped_samples: self
                    .latency_histogram_clamped_samples
                    .load(Ordering::Relaxed),
                parallel_encode_workers_spawned: self
                    .parallel_encode_workers_spawned
                    .load(Ordering::Relaxed),
                dynamic_key_dictionary_entries: self
                    .dynamic_key_dictionary_entries
                    .load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                validation_errors: self.validation_errors.load(Ordering::Relaxed),
                internal_errors: self.internal_errors.load(Ordering::Relaxed),
                websocket_errors: self.websocket_errors.load(Ordering::Relaxed),
                total_errors,
            },
            dirty_tracking_ema,
        }
    }
}

impl ResponseTimeTracker {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
            lowest_discernible_micros: DEFAULT_LOWEST_DISCERNIBLE_MICROS,
            highest_trackable_micros: DEFAULT_HIGHEST_TRACKABLE_MICROS,
            significant_figures: DEFAULT_SIGNIFICANT_FIGURES,
        }
    }

    #[cfg(test)]
    pub fn with_bounds(
        lowest_discernible_micros: u64,
        highest_trackable_micros: u64,
        significant_figures: u8,
    ) -> Self {
        Self {
            operations: HashMap::new(),
            lowest_discernible_micros: lowest_discernible_micros.max(1),
            highest_trackable_micros: highest_trackable_micros
                .max(lowest_discernible_micros.max(1)),
            significant_figures: significant_figures.clamp(1, 5),
        }
    }

    /// Records a sample for `operation` (here: a land type). Returns whether
    /// the sample exceeded the tracked range and was clamped.
    pub fn add_sample(&mut self, operation: &str, duration: Duration) -> bool {
        let micros = duration_to_micros(duration);
        let lowest = self.lowest_discernible_micros;
        let highest = self.highest_trackable_micros;
        let significant = self.significant_figures;
        let histogram = self
            .operations
            .entry(operation.to_string())
            .or_insert_with(|| OperationLatencyHistogram::new(lowest, highest, significant));

        histogram.record(micros, highest)
    }

    pub fn get_latency_metrics(&self, operation: &str) -> Option<OperationLatencyMetrics> {
        let histogram = self.operations.get(operation)?;
        histogram.metrics()
    }

    /// Merges every tracked land type's histogram into one aggregate view,
    /// since the `/metrics` snapshot reports overall sync-cycle latency
    /// rather than breaking it out per land type.
    fn aggregate_metrics(&self) -> Option<OperationLatencyMetrics> {
        let mut sample_count = 0u64;
        let mut sum_ms = 0f64;
        let mut min_ms: Option<f64> = None;
        let mut max_ms: Option<f64> = None;
        let mut p50 = 0f64;
        let mut p95 = 0f64;
        let mut p99 = 0f64;
        let mut tracked = 0u64;

        for histogram in self.operations.values() {
            let Some(metrics) = histogram.metrics() else {
                continue;
            };
            sample_count += metrics.sample_count;
            if let Some(avg) = metrics.average_ms {
                sum_ms += avg * metrics.sample_count as f64;
            }
            min_ms = Some(min_ms.map_or(metrics.min_ms.unwrap_or(f64::MAX), |m| {
                m.min(metrics.min_ms.unwrap_or(f64::MAX))
            }));
            max_ms = Some(max_ms.map_or(metrics.max_ms.unwrap_or(0.0), |m| {
                m.max(metrics.max_ms.unwrap_or(0.0))
            }));
            p50 += metrics.p50_ms.unwrap_or(0.0);
            p95 += metrics.p95_ms.unwrap_or(0.0);
            p99 += metrics.p99_ms.unwrap_or(0.0);
            tracked += 1;
        }

        if sample_count == 0 || tracked == 0 {
            return None;
        }

        Some(OperationLatencyMetrics {
            average_ms: Some(sum_ms / sample_count as f64),
            p50_ms: Some(p50 / tracked as f64),
            p95_ms: Some(p95 / tracked as f64),
            p99_ms: Some(p99 / tracked as f64),
            min_ms,
            max_ms,
            sample_count,
        })
    }
}

impl OperationLatencyHistogram {
    fn new(
        lowest_discernible_micros: u64,
        highest_trackable_micros: u64,
        significant_figures: u8,
    ) -> Self {
        let lowest = lowest_discernible_micros.max(1);
        let highest = highest_trackable_micros.max(lowest);
        let sig_figs = significant_figures.clamp(1, 5);

        let histogram = Histogram::new_with_bounds(lowest, highest, sig_figs)
            .or_else(|e| {
                tracing::warn!(
                    target: "metrics",
                    error = %e,
                    lowest,
                    highest,
                    sig_figs,
                    "failed to create histogram with requested bounds, using unbounded fallback"
                );
                Histogram::new(2)
            })
            .or_else(|_| {
                tracing::error!(target: "metrics", "Histogram::new(2) failed, trying sig_figs=1");
                Histogram::new(1)
            })
            .ok();

        if histogram.is_none() {
            tracing::error!(target: "metrics", "all histogram creation attempts failed - metrics will not be recorded");
        }

        Self { histogram }
    }

    fn record(&mut self, micros: u64, highest_trackable_micros: u64) -> bool {
        let was_clamped = micros > highest_trackable_micros;
        let value = if was_clamped {
            highest_trackable_micros
        } else {
            micros
        };
        if let Some(ref mut histogram) = self.histogram {
            if let Err(error) = histogram.record(value) {
                tracing::warn!(
                    target: "metrics",
                    %error,
                    clamped_value = value,
                    highest_trackable_micros,
                    "failed to record latency sample"
                );
            }
        }
        was_clamped
    }

    fn metrics(&self) -> Option<OperationLatencyMetrics> {
        let histogram = self.histogram.as_ref()?;
        if histogram.is_empty() {
            return None;
        }

        Some(OperationLatencyMetrics {
            average_ms: Some(histogram.mean() / MICROS_PER_MS),
            p50_ms: Some(self.percentile(50.0)),
            p95_ms: Some(self.percentile(95.0)),
            p99_ms: Some(self.percentile(99.0)),
            min_ms: Some(histogram.min() as f64 / MICROS_PER_MS),
            max_ms: Some(histogram.max() as f64 / MICROS_PER_MS),
            sample_count: histogram.len(),
        })
    }

    fn percentile(&self, percentile: f64) -> f64 {
        self.histogram
            .as_ref()
            .map(|h| h.value_at_percentile(percentile) as f64 / MICROS_PER_MS)
            .unwrap_or(0.0)
    }
}

const MICROS_PER_MS: f64 = 1000.0;

fn duration_to_micros(duration: Duration) -> u64 {
    duration.as_micros().min(u128::from(u64::MAX)) as u64
}

/// Utility for timing an operation and recording its duration once dropped
/// scope ends (paired with an explicit `finish()` call since async drop
/// doesn't exist).
pub struct OperationTimer {
    land_type: String,
    start: Instant,
    metrics: Arc<ServerMetrics>,
}

impl OperationTimer {
    pub fn new(land_type: &str, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            land_type: land_type.to_string(),
            start: Instant::now(),
            metrics,
        }
    }

    pub async fn finish(self) {
        let duration = self.start.elapsed();
        self.metrics.record_sync_cycle(&self.land_type, duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn decrement_active_connections_does_not_underflow() {
        let metrics = ServerMetrics::new();

        for _ in 0..10 {
            metrics.decrement_active_connections();
        }

        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.disconnections.load(Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn concurrent_increment_then_decrement_yields_correct_count() {
        let metrics = Arc::new(ServerMetrics::new());

        let inc_barrier = Arc::new(tokio::sync::Barrier::new(100));
        let mut handles = Vec::with_capacity(100);
        for _ in 0..100 {
            let metrics = Arc::clone(&metrics);
            let barrier = Arc::clone(&inc_barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                metrics.increment_connections();
            }));
        }
        for handle in handles {
            handle.await.expect("increment task should not panic");
        }
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 100);

        let dec_barrier = Arc::new(tokio::sync::Barrier::new(50));
        let mut handles = Vec::with_capacity(50);
        for _ in 0..50 {
            let metrics = Arc::clone(&metrics);
            let barrier = Arc::clone(&dec_barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                metrics.decrement_active_connections();
            }));
        }
        for handle in handles {
            handle.await.expect("decrement task should not panic");
        }

        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 50);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 100);
    }

    #[tokio::test]
    async fn sync_cycle_latency_is_tracked_per_snapshot() {
        let metrics = ServerMetrics::new();
        metrics
            .record_sync_cycle("lobby", Duration::from_millis(5))
            .await;
        metrics
            .record_sync_cycle("arena", Duration::from_millis(15))
            .await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.sync.sync_cycles, 2);
        assert_eq!(snapshot.sync.sync_cycle_latency.sample_count, 2);
    }

    #[tokio::test]
    async fn dirty_tracking_ema_is_reported_per_land_type() {
        let metrics = ServerMetrics::new();
        metrics.record_dirty_tracking_ema("lobby", 0.42).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.dirty_tracking_ema.get("lobby"), Some(&0.42));
    }
}
