//! Server configuration from environment.

use std::env;
use std::str::FromStr;

use dockroute_core::{ChargingModel, ComplianceConfig, OptimizerConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_path: String,
    pub database_max_connections: u32,
    /// Regulatory feed endpoint; the sync loop is disabled when unset.
    pub feed_url: Option<String>,
    pub feed_interval_secs: u64,
    pub feed_timeout_secs: u64,
    pub compliance: ComplianceConfig,
    pub charging: ChargingModel,
    pub optimizer: OptimizerConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let compliance = ComplianceConfig {
            buffer_distance_m: env_or("DOCKROUTE_BUFFER_M", 100.0_f64).max(0.0),
            ..ComplianceConfig::default()
        };
        let optimizer = OptimizerConfig {
            max_reservation_attempts: env_or("DOCKROUTE_MAX_RESERVATION_ATTEMPTS", 3_u32).max(1),
            ..OptimizerConfig::default()
        };

        Self {
            server_port: env_or("DOCKROUTE_PORT", 3000),
            database_path: env::var("DOCKROUTE_DATABASE_PATH")
                .unwrap_or_else(|_| "data/dockroute.db".to_string()),
            database_max_connections: env_or("DOCKROUTE_DB_MAX_CONNECTIONS", 5),
            feed_url: env::var("DOCKROUTE_FEED_URL")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            feed_interval_secs: env_or("DOCKROUTE_FEED_INTERVAL_SECS", 60_u64).max(1),
            feed_timeout_secs: env_or("DOCKROUTE_FEED_TIMEOUT_SECS", 10_u64).max(1),
            compliance,
            charging: ChargingModel::default(),
            optimizer,
        }
    }
}
