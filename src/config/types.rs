//! Root configuration types.

use super::defaults::default_port;
use super::land::LandConfigSet;
use super::logging::LoggingConfig;
use super::metrics::MetricsConfig;
use super::security::SecurityConfig;
use super::server::GatewayConfig;
use serde::{Deserialize, Serialize};

/// Root configuration struct.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub server: GatewayConfig,
    #[serde(default)]
    pub land: LandConfigSet,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            server: GatewayConfig::default(),
            land: LandConfigSet::default(),
            logging: LoggingConfig::default(),
            security: SecurityConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
