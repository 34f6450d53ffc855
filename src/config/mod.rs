//! Configuration module.
//!
//! This module provides comprehensive configuration management with support for:
//! - JSON configuration files
//! - Environment variable overrides
//! - Stdin input
//! - Sensible defaults
//!
//! # Module Structure
//!
//! - [`crate::config::types`]: Root `Config` struct
//! - [`server`]: Gateway-wide land lifecycle configuration
//! - [`land`]: Per-land-type runtime configuration (`LandRuntimeConfig` table)
//! - [`security`]: Transport security settings (CORS, TLS, metrics auth)
//! - [`logging`]: Logging configuration
//! - [`metrics`]: Metrics configuration
//! - [`crate::config::loader`]: Configuration loading functions
//! - [`crate::config::validation`]: Configuration validation functions
//! - [`crate::config::defaults`]: Default value functions

// Submodules
pub mod defaults;
pub mod land;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod security;
pub mod server;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use land::LandConfigSet;

pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use metrics::MetricsConfig;

pub use security::{ClientAuthMode, SecurityConfig, TlsServerConfig, TransportSecurityConfig};

pub use server::GatewayConfig;

pub use types::Config;

pub use validation::{is_production_mode, validate_config_security};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 3536);
        assert_eq!(config.server.default_land_type, "default");
        assert_eq!(config.server.session_idle_timeout_secs, 300);
        assert_eq!(config.server.land_cleanup_interval_secs, 60);
        assert_eq!(config.server.max_lands_per_type, 1000);
        assert_eq!(config.server.empty_land_timeout_secs, 300);

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "server.log");
        assert_eq!(config.logging.rotation, "daily");

        assert!(config.metrics.enabled);
        assert_eq!(config.security.cors_origins, "http://localhost:3000,http://localhost:5173");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(
            config.server.default_land_type,
            deserialized.server.default_land_type
        );
        assert_eq!(
            config.metrics.latency_histogram_max_value_ms,
            deserialized.metrics.latency_histogram_max_value_ms
        );
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_log_level_as_str() {
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_eq!(LogLevel::Debug.as_str(), "debug");
        assert_eq!(LogLevel::Info.as_str(), "info");
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(LogLevel::Error.as_str(), "error");
    }

    #[test]
    fn land_overrides_apply_per_land_type() {
        let mut config = Config::default();
        config.land.overrides.insert(
            "arena".to_string(),
            crate::land::LandRuntimeConfig {
                enable_legacy_join: true,
                ..Default::default()
            },
        );
        assert!(config.land.for_land_type("arena").enable_legacy_join);
        assert!(!config.land.for_land_type("lobby").enable_legacy_join);
    }
}
