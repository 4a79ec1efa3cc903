//! Application configuration.
//!
//! Values come from an optional TOML file, then environment variables
//! override individual fields. A missing file means built-in defaults.

use crate::error::{AppError, AppResult};
use coinflow_core::{TrackedSymbols, DEFAULT_TRACKED_SYMBOLS};
use coinflow_persistence::{BufferConfig, RetryPolicy, StoreConfig};
use coinflow_ws::connection::DEFAULT_FEED_URL;
use coinflow_ws::ConnectionConfig;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Upstream feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Fixed cooldown before reconnecting (ms).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl From<&FeedConfig> for ConnectionConfig {
    fn from(cfg: &FeedConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            heartbeat_interval_ms: cfg.heartbeat_interval_ms,
            heartbeat_timeout_ms: cfg.heartbeat_timeout_ms,
            reconnect_delay_ms: cfg.reconnect_delay_ms,
        }
    }
}

/// Flush buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferSettings {
    /// Flush at this many records (`BATCH_SIZE`).
    #[serde(default = "default_size_threshold")]
    pub size_threshold: usize,
    /// Flush after this many seconds without a successful flush (`FLUSH_SECS`).
    #[serde(default = "default_time_threshold_secs")]
    pub time_threshold_secs: f64,
    /// Retention ceiling while the store is unavailable.
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
}

fn default_size_threshold() -> usize {
    200
}

fn default_time_threshold_secs() -> f64 {
    1.0
}

fn default_max_retained() -> usize {
    100_000
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            size_threshold: default_size_threshold(),
            time_threshold_secs: default_time_threshold_secs(),
            max_retained: default_max_retained(),
        }
    }
}

impl BufferSettings {
    pub fn buffer_config(&self) -> AppResult<BufferConfig> {
        if self.time_threshold_secs.is_nan() || self.time_threshold_secs <= 0.0 {
            return Err(AppError::Config(format!(
                "buffer.time_threshold_secs must be positive, got {}",
                self.time_threshold_secs
            )));
        }
        let time_threshold = Duration::try_from_secs_f64(self.time_threshold_secs)
            .map_err(|e| AppError::Config(format!("buffer.time_threshold_secs: {e}")))?;

        let config = BufferConfig {
            size_threshold: self.size_threshold,
            time_threshold,
            max_retained: self.max_retained,
        };
        config
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(config)
    }
}

/// PostgreSQL settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Create tables at startup if missing.
    #[serde(default = "default_ensure_schema")]
    pub ensure_schema: bool,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "coinflow".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

fn default_ensure_schema() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            connect_attempts: default_connect_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            ensure_schema: default_ensure_schema(),
        }
    }
}

// Keeps the password out of logs
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("connect_attempts", &self.connect_attempts)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("backoff_max_ms", &self.backoff_max_ms)
            .field("write_timeout_ms", &self.write_timeout_ms)
            .field("ensure_schema", &self.ensure_schema)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user);
        if self.password.is_empty() {
            options
        } else {
            options.password(&self.password)
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            connect: self.connect_options(),
            retry: RetryPolicy {
                max_attempts: self.connect_attempts,
                base_delay: Duration::from_millis(self.backoff_base_ms),
                max_delay: Duration::from_millis(self.backoff_max_ms),
            },
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Port for `/metrics` and `/health`. 0 disables the server.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tracked instrument allow-list.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub buffer: BufferSettings,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_symbols() -> Vec<String> {
    DEFAULT_TRACKED_SYMBOLS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            feed: FeedConfig::default(),
            buffer: BufferSettings::default(),
            database: DatabaseConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load the file at `path` (defaults if absent), apply environment
    /// overrides and validate.
    pub fn load(path: &str) -> AppResult<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!(path, "Config file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("POSTGRES_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("POSTGRES_PORT") {
            self.database.port = parse_var("POSTGRES_PORT", &v)?;
        }
        if let Some(v) = lookup("POSTGRES_DB") {
            self.database.name = v;
        }
        if let Some(v) = lookup("POSTGRES_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("POSTGRES_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("BATCH_SIZE") {
            self.buffer.size_threshold = parse_var("BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("FLUSH_SECS") {
            self.buffer.time_threshold_secs = parse_var("FLUSH_SECS", &v)?;
        }
        if let Some(v) = lookup("MAX_RETAINED_RECORDS") {
            self.buffer.max_retained = parse_var("MAX_RETAINED_RECORDS", &v)?;
        }
        if let Some(v) = lookup("FEED_URL") {
            self.feed.url = v;
        }
        if let Some(v) = lookup("METRICS_PORT") {
            self.telemetry.metrics_port = parse_var("METRICS_PORT", &v)?;
        }
        if let Some(v) = lookup("TRACKED_SYMBOLS") {
            self.symbols = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        self.buffer.buffer_config()?;

        if self.symbols.is_empty() {
            return Err(AppError::Config("symbols must not be empty".to_string()));
        }
        self.tracked_symbols()?;

        if !(self.feed.url.starts_with("ws://") || self.feed.url.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "feed.url must be a ws:// or wss:// URL, got {}",
                self.feed.url
            )));
        }
        if self.feed.heartbeat_interval_ms == 0 || self.feed.heartbeat_timeout_ms == 0 {
            return Err(AppError::Config(
                "feed heartbeat interval and timeout must be positive".to_string(),
            ));
        }
        if self.database.write_timeout_ms == 0 {
            return Err(AppError::Config(
                "database.write_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tracked_symbols(&self) -> AppResult<TrackedSymbols> {
        Ok(TrackedSymbols::from_strs(
            self.symbols.iter().map(String::as_str),
        )?)
    }
}

fn parse_var<T>(name: &str, value: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{name}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbols.len(), 20);
        assert_eq!(config.buffer.size_threshold, 200);
        assert_eq!(config.buffer.time_threshold_secs, 1.0);
        assert_eq!(config.feed.url, DEFAULT_FEED_URL);
        assert!(config.database.ensure_schema);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = AppConfig::from_toml(
            r#"
            symbols = ["btcusdt", "ETHUSDT"]

            [buffer]
            size_threshold = 50

            [database]
            host = "db.internal"
            "#,
        )
        .unwrap();

        assert_eq!(config.buffer.size_threshold, 50);
        assert_eq!(config.buffer.max_retained, 100_000);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.tracked_symbols().unwrap().len(), 2);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("POSTGRES_HOST", "pg"),
                ("POSTGRES_PORT", "6543"),
                ("POSTGRES_PASSWORD", "s3cret"),
                ("BATCH_SIZE", "500"),
                ("FLUSH_SECS", "2.5"),
                ("TRACKED_SYMBOLS", "BTCUSDT, solusdt,,"),
                ("METRICS_PORT", "0"),
            ]))
            .unwrap();

        assert_eq!(config.database.host, "pg");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.buffer.size_threshold, 500);
        assert_eq!(
            config.buffer.buffer_config().unwrap().time_threshold,
            Duration::from_millis(2500)
        );
        assert_eq!(config.symbols, vec!["BTCUSDT", "solusdt"]);
        assert!(config.tracked_symbols().unwrap().contains("SOLUSDT"));
        assert_eq!(config.telemetry.metrics_port, 0);
        assert!(!format!("{:?}", config.database).contains("s3cret"));
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(env(&[("BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("BATCH_SIZE")));
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = AppConfig::default();
        config.buffer.size_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.buffer.time_threshold_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.buffer.time_threshold_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.buffer.max_retained = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_symbols_and_url() {
        let mut config = AppConfig::default();
        config.symbols = vec!["BTC/USDT".to_string()];
        assert!(matches!(config.validate(), Err(AppError::Core(_))));

        let mut config = AppConfig::default();
        config.symbols.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.feed.url = "https://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_mapping() {
        let config = DatabaseConfig {
            connect_attempts: 3,
            backoff_base_ms: 500,
            write_timeout_ms: 2_000,
            ..Default::default()
        };
        let store = config.store_config();
        assert_eq!(store.retry.max_attempts, 3);
        assert_eq!(store.retry.base_delay, Duration::from_millis(500));
        assert_eq!(store.write_timeout, Duration::from_secs(2));
        assert_eq!(store.connect.get_host(), "localhost");
        assert_eq!(store.connect.get_port(), 5432);
    }

    #[test]
    fn test_feed_config_conversion() {
        let feed = FeedConfig {
            url: "ws://127.0.0.1:9000".to_string(),
            ..Default::default()
        };
        let conn = ConnectionConfig::from(&feed);
        assert_eq!(conn.url, "ws://127.0.0.1:9000");
        assert_eq!(conn.reconnect_delay_ms, 5_000);
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let path = "/nonexistent/coinflow.toml";
        assert!(AppConfig::from_file(path).is_err());
        // load() falls back instead of failing
        assert!(AppConfig::load(path).is_ok());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let text = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../config/default.toml"
        ));
        let shipped = AppConfig::from_toml(text).unwrap();
        let defaults = AppConfig::default();

        assert!(shipped.validate().is_ok());
        assert_eq!(shipped.symbols, defaults.symbols);
        assert_eq!(shipped.feed.url, defaults.feed.url);
        assert_eq!(shipped.buffer.size_threshold, defaults.buffer.size_threshold);
        assert_eq!(shipped.buffer.max_retained, defaults.buffer.max_retained);
        assert_eq!(shipped.database.port, defaults.database.port);
        assert_eq!(
            shipped.database.write_timeout_ms,
            defaults.database.write_timeout_ms
        );
        assert_eq!(shipped.telemetry.metrics_port, defaults.telemetry.metrics_port);
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("size_threshold"));
        assert!(toml_str.contains("metrics_port"));
    }
}
