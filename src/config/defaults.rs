//! Default value functions for configuration fields.
//!
//! This module contains all the default value functions used by serde's `#[serde(default = ...)]`
//! attributes throughout the configuration system. Functions are organized by category for
//! easier maintenance.

use super::logging::LogFormat;
use super::security::ClientAuthMode;

// =============================================================================
// Port & Root Config
// =============================================================================

pub const fn default_port() -> u16 {
    3536
}

// =============================================================================
// Gateway Defaults
// =============================================================================

pub fn default_default_land_type() -> String {
    "default".to_string()
}

pub const fn default_session_idle_timeout_secs() -> u64 {
    300 // 5 minutes
}

pub const fn default_land_cleanup_interval_secs() -> u64 {
    60
}

pub const fn default_max_lands_per_type() -> usize {
    1000
}

pub const fn default_empty_land_timeout_secs() -> u64 {
    300 // 5 minutes
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    true
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// =============================================================================
// Security Defaults
// =============================================================================

pub fn default_cors_origins() -> String {
    "http://localhost:3000,http://localhost:5173".to_string()
}

pub const fn default_require_metrics_auth() -> bool {
    true // Enforce authentication on the metrics endpoint by default
}

pub const fn default_max_message_size() -> usize {
    65536 // 64KB
}

pub const fn default_max_connections_per_ip() -> usize {
    10
}

pub const fn default_client_auth_mode() -> ClientAuthMode {
    ClientAuthMode::None
}

// =============================================================================
// Metrics Defaults
// =============================================================================

pub const fn default_enable_metrics() -> bool {
    true
}

pub const fn default_latency_histogram_max_value_ms() -> u64 {
    60_000 // 1 minute
}
