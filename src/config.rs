use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_with::{serde_as, DurationMilliSeconds};
use std::env;
use std::time::Duration;
use validator::Validate;

use crate::core::settings::ConnectionSettings;
use crate::core::util::interval_util::parse_interval;
use crate::domain::query::service::dispatcher::{DispatchLimits, DEFAULT_MAX_CONCURRENT_QUERIES};
use crate::domain::query::service::interval_calculator::{IntervalCalculator, DEFAULT_TARGET_POINTS};

const ENV_PREFIX: &str = "ASTRA_";

/// Process configuration for the datasource service
#[derive(Debug, Clone, Serialize, Validate)]
pub struct AppConfig {
    /// Address to bind the HTTP server to
    #[validate(length(min = 1))]
    pub bind_address: String,

    /// Backend connection
    #[validate(nested)]
    pub connection: ConnectionSettings,

    /// Interval and dispatch limits
    #[validate(nested)]
    pub query: QueryLimitsConfig,

    pub logging: LoggingConfig,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Validate)]
pub struct QueryLimitsConfig {
    /// Buckets aimed for when a query sets no `maxDataPoints`
    #[validate(range(min = 1))]
    pub target_points: u32,

    /// Floor for computed intervals
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub min_interval: Duration,

    #[validate(range(min = 1))]
    pub max_concurrent_queries: usize,

    /// Whole-batch deadline; 0 disables it
    pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,

    /// Directory for daily rolling log files; stdout only when unset
    pub dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            connection: ConnectionSettings::default(),
            query: QueryLimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for QueryLimitsConfig {
    fn default() -> Self {
        Self {
            target_points: DEFAULT_TARGET_POINTS,
            min_interval: Duration::from_secs(1),
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            query_timeout_ms: 60_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

impl QueryLimitsConfig {
    pub fn dispatch_limits(&self) -> DispatchLimits {
        DispatchLimits {
            max_concurrent_queries: self.max_concurrent_queries,
            query_timeout: (self.query_timeout_ms > 0)
                .then(|| Duration::from_millis(self.query_timeout_ms)),
        }
    }

    pub fn interval_calculator(&self) -> IntervalCalculator {
        IntervalCalculator::new(self.min_interval, self.target_points)
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults
    pub fn load() -> Result<Self> {
        let config = Self::from_lookup(|key| env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        config.validate_config()?;
        Ok(config)
    }

    /// Build from an arbitrary key lookup; keys come without the `ASTRA_` prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bind) = lookup("BIND_ADDRESS") {
            config.bind_address = bind;
        }

        // Connection
        let conn = &mut config.connection;
        if let Some(url) = lookup("URL") {
            conn.url = url;
        }
        if let Some(database) = lookup("DATABASE") {
            conn.database = database;
        }
        if let Some(time_field) = lookup("TIME_FIELD") {
            conn.time_field = time_field;
        }
        conn.log_message_field = lookup("LOG_MESSAGE_FIELD");
        conn.log_level_field = lookup("LOG_LEVEL_FIELD");
        conn.basic_auth_user = lookup("BASIC_AUTH_USER");
        conn.basic_auth_password = lookup("BASIC_AUTH_PASSWORD");
        if let Some(timeout) = lookup("TIMEOUT_MS") {
            conn.timeout_ms = parse_var("TIMEOUT_MS", &timeout)?;
        }
        if let Some(shards) = lookup("MAX_CONCURRENT_SHARD_REQUESTS") {
            conn.max_concurrent_shard_requests = parse_var("MAX_CONCURRENT_SHARD_REQUESTS", &shards)?;
        }
        if let Some(limit) = lookup("LOGS_LIMIT") {
            conn.logs_limit = parse_var("LOGS_LIMIT", &limit)?;
        }

        // Query limits
        if let Some(points) = lookup("TARGET_POINTS") {
            config.query.target_points = parse_var("TARGET_POINTS", &points)?;
        }
        if let Some(min) = lookup("MIN_INTERVAL") {
            config.query.min_interval = parse_interval(&min)?
                .ok_or_else(|| anyhow!("{ENV_PREFIX}MIN_INTERVAL must be a concrete interval, got '{min}'"))?;
        }
        if let Some(max) = lookup("MAX_CONCURRENT_QUERIES") {
            config.query.max_concurrent_queries = parse_var("MAX_CONCURRENT_QUERIES", &max)?;
        }
        if let Some(timeout) = lookup("QUERY_TIMEOUT_MS") {
            config.query.query_timeout_ms = parse_var("QUERY_TIMEOUT_MS", &timeout)?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level;
        }
        config.logging.dir = lookup("LOG_DIR").filter(|d| !d.trim().is_empty());

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate_config(&self) -> Result<()> {
        self.validate()
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

        if self.query.min_interval < Duration::from_secs(1) {
            return Err(anyhow!("Min interval must be at least 1s"));
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {ENV_PREFIX}{key} '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        config.validate_config().unwrap();
        assert_eq!(config.connection.database, "_all");
        assert_eq!(config.connection.time_field, "_timesinceepoch");
        assert_eq!(config.query.target_points, 120);
        assert_eq!(
            config.query.dispatch_limits().query_timeout,
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn overrides_from_lookup() {
        let config = AppConfig::from_lookup(lookup(&[
            ("URL", "http://astra:9200"),
            ("DATABASE", "logs-*"),
            ("BASIC_AUTH_USER", "grafana"),
            ("MIN_INTERVAL", "10s"),
            ("MAX_CONCURRENT_QUERIES", "3"),
            ("QUERY_TIMEOUT_MS", "0"),
            ("LOG_DIR", "  "),
        ]))
        .unwrap();

        assert_eq!(config.connection.url, "http://astra:9200");
        assert_eq!(config.connection.database, "logs-*");
        assert_eq!(config.connection.basic_auth_user.as_deref(), Some("grafana"));
        assert_eq!(config.query.min_interval, Duration::from_secs(10));
        let limits = config.query.dispatch_limits();
        assert_eq!(limits.max_concurrent_queries, 3);
        assert_eq!(limits.query_timeout, None);
        assert_eq!(config.logging.dir, None);
    }

    #[test]
    fn unparsable_number_names_the_variable() {
        let err = AppConfig::from_lookup(lookup(&[("TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("ASTRA_TIMEOUT_MS"), "{}", err);
    }

    #[test]
    fn auto_min_interval_is_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("MIN_INTERVAL", "auto")])).is_err());
    }

    #[test]
    fn validation_catches_zero_limits_and_bad_url() {
        let config = AppConfig::from_lookup(lookup(&[
            ("URL", "nope"),
            ("MAX_CONCURRENT_QUERIES", "0"),
        ]))
        .unwrap();
        let err = config.validate_config().unwrap_err().to_string();
        assert!(err.contains("url"), "{}", err);
        assert!(err.contains("max_concurrent_queries"), "{}", err);
    }

    #[test]
    fn password_stays_out_of_serialized_config() {
        let config = AppConfig::from_lookup(lookup(&[("BASIC_AUTH_PASSWORD", "hunter2")])).unwrap();
        assert_eq!(config.connection.basic_auth_password.as_deref(), Some("hunter2"));
        assert!(!serde_json::to_string(&config).unwrap().contains("hunter2"));
    }
}
