//! Configuration module for water-billing-service.

use service_core::config::{self as core_config, get_env, get_env_parsed, is_production};
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// When false, notices go to the mock gateway and are only logged.
    pub enabled: bool,
    pub service_url: String,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_url: "http://localhost:3004".to_string(),
            timeout_secs: 10,
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = is_production();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "water-billing-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: get_env_parsed("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: get_env_parsed("DATABASE_MIN_CONNECTIONS", 1),
            },
            notification: NotificationConfig {
                enabled: get_env_parsed("NOTIFICATION_ENABLED", false),
                service_url: get_env(
                    "NOTIFICATION_SERVICE_URL",
                    Some("http://localhost:3004"),
                    is_prod,
                )?,
                timeout_secs: get_env_parsed("NOTIFICATION_TIMEOUT_SECS", 10),
            },
        })
    }
}
