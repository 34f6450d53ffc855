//! Metrics configuration.

use super::defaults::{default_enable_metrics, default_latency_histogram_max_value_ms};
use serde::{Deserialize, Serialize};

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enables the `/metrics` and `/metrics/prom` HTTP endpoints.
    pub enabled: bool,
    /// Upper bound (ms) the sync-cycle latency histogram clamps samples to.
    pub latency_histogram_max_value_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enable_metrics(),
            latency_histogram_max_value_ms: default_latency_histogram_max_value_ms(),
        }
    }
}
