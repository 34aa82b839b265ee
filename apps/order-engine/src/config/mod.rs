//! Configuration module for the order engine.
//!
//! Loads `config.yaml` (or the file named by `ORDER_ENGINE_CONFIG`),
//! interpolates `${VAR}` / `${VAR:-default}` references from the
//! environment and validates the result.
//!
//! # Usage
//!
//! ```rust,ignore
//! use order_engine::config::{Config, load_config};
//!
//! let config = load_config(None)?;
//! println!("HTTP port: {}", config.server.http_port);
//! ```

mod control;
mod exchange;
mod execution;
mod observability;
mod persistence;
mod recovery;
mod server;
mod stops;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use control::ControlConfig;
pub use exchange::{ExchangeConfig, ExchangeMode, RetrySettings};
pub use execution::ExecutionConfig;
pub use observability::{LoggingConfig, MetricsSettings, ObservabilityConfig};
pub use persistence::PersistenceConfig;
pub use recovery::{MIN_RESTART_THROTTLE_SECS, RecoveryConfig};
pub use server::ServerConfig;
pub use stops::StopsConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "ORDER_ENGINE_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP control plane.
    #[serde(default)]
    pub server: ServerConfig,
    /// Exchange connection.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Order execution.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Stop enforcement.
    #[serde(default)]
    pub stops: StopsConfig,
    /// Crash recovery.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// State store.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Bot control plane client.
    #[serde(default)]
    pub control: ControlConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// Without `path`, `ORDER_ENGINE_CONFIG` is consulted, then `config.yaml`.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(
        || std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.yaml".to_string()),
        str::to_string,
    );

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_match.as_str()) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match.as_str(), &value);
    }

    result
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.exchange.mode == ExchangeMode::Bybit && !config.exchange.has_credentials() {
        return Err(ConfigError::MissingEnvVar(
            "exchange.api_key and exchange.api_secret are required in bybit mode".to_string(),
        ));
    }

    if config.exchange.position_categories.is_empty() {
        return Err(ConfigError::ValidationError(
            "exchange.position_categories must not be empty".to_string(),
        ));
    }

    if config.exchange.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "exchange.retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.exchange.retry.multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "exchange.retry.multiplier must be at least 1.0".to_string(),
        ));
    }

    let slippage = config.execution.max_acceptable_slippage;
    if slippage < Decimal::ZERO || slippage >= Decimal::ONE {
        return Err(ConfigError::ValidationError(
            "execution.max_acceptable_slippage must be in [0, 1)".to_string(),
        ));
    }

    if config.execution.monitor_interval_secs == 0 || config.recovery.monitor_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "monitor intervals must be positive".to_string(),
        ));
    }

    let trail = config.stops.default_trail_distance;
    if trail <= Decimal::ZERO || trail >= Decimal::ONE {
        return Err(ConfigError::ValidationError(
            "stops.default_trail_distance must be in (0, 1)".to_string(),
        ));
    }

    if config.recovery.restart_throttle_secs < MIN_RESTART_THROTTLE_SECS {
        return Err(ConfigError::ValidationError(format!(
            "recovery.restart_throttle_secs must be at least {MIN_RESTART_THROTTLE_SECS}"
        )));
    }

    if config.persistence.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "persistence.max_connections must be at least 1".to_string(),
        ));
    }

    let valid_formats = ["json", "pretty"];
    if !valid_formats.contains(&config.observability.logging.format.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be one of: {valid_formats:?}"
        )));
    }

    if config.observability.metrics.enabled
        && config.observability.metrics.port == config.server.http_port
    {
        return Err(ConfigError::ValidationError(
            "metrics port and http_port must be different".to_string(),
        ));
    }

    Ok(())
}
