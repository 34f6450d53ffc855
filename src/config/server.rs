//! Gateway-level behavior configuration: land lifecycle knobs that apply
//! across every land type.

use super::defaults::{
    default_default_land_type, default_empty_land_timeout_secs,
    default_land_cleanup_interval_secs, default_max_lands_per_type,
    default_session_idle_timeout_secs,
};
use serde::{Deserialize, Serialize};

/// Process-wide land lifecycle configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GatewayConfig {
    /// Land type assumed when legacy (single-room) join mode is enabled and
    /// a `join` frame is accepted without a `landType` round trip.
    #[serde(default = "default_default_land_type")]
    pub default_land_type: String,
    /// A connected-but-unjoined session is dropped after this many idle
    /// seconds.
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,
    /// Interval between `LandManager` expiry sweeps.
    #[serde(default = "default_land_cleanup_interval_secs")]
    pub land_cleanup_interval_secs: u64,
    /// Upper bound on concurrently live land instances per land type.
    #[serde(default = "default_max_lands_per_type")]
    pub max_lands_per_type: usize,
    /// A land with zero joined players for this many seconds is eligible
    /// for removal by the cleanup sweep.
    #[serde(default = "default_empty_land_timeout_secs")]
    pub empty_land_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_land_type: default_default_land_type(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            land_cleanup_interval_secs: default_land_cleanup_interval_secs(),
            max_lands_per_type: default_max_lands_per_type(),
            empty_land_timeout_secs: default_empty_land_timeout_secs(),
        }
    }
}
