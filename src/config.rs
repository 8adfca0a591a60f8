//! Configuration management with validation and defaults
//!
//! Configuration is read from an optional TOML file, then overridden by
//! `TWOD_*` environment variables, then validated.

use crate::errors::{ConfigurationError, LedgerResult};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete ledger configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub betting: BettingConfig,
    pub settlement: SettlementConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

/// Which store implementation backs the ledger
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Rocks,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

/// Storage configuration with RocksDB tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: usize,
    pub compression_type: CompressionType,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Rocks,
            data_directory: "./DB/ledger_data".to_string(),
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            compression_type: CompressionType::Lz4,
            clear_on_start: false,
        }
    }
}

/// Operating time zone and the two daily sessions
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Offset of the operating time zone from UTC, in minutes (Yangon is +390)
    pub utc_offset_minutes: i32,
    /// Local time at which the morning session hands over to the evening one
    pub session_boundary: String,
    /// Betting cutoff for the morning session (local "HH:MM")
    pub morning_cutoff: String,
    /// Betting cutoff for the evening session (local "HH:MM")
    pub evening_cutoff: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 6 * 60 + 30,
            session_boundary: "12:00".to_string(),
            morning_cutoff: "11:45".to_string(),
            evening_cutoff: "15:45".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime, ConfigValidationError> {
        NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| {
            ConfigValidationError::InvalidValue(format!("{} '{}' is not HH:MM ({})", field, value, e))
        })
    }
}

/// Stake bounds and optimistic retry budget for bet placement
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BettingConfig {
    pub min_stake: u64,
    pub max_stake: u64,
    pub max_commit_attempts: u32,
}

impl Default for BettingConfig {
    fn default() -> Self {
        Self {
            min_stake: 100,
            max_stake: 100_000,
            max_commit_attempts: 5,
        }
    }
}

/// What settlement does with wagers that stayed pending for too long
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StaleWagerPolicy {
    /// Leave them pending indefinitely
    Keep,
    /// Return the stake to the owner
    Refund,
    /// Retire them as lost
    Forfeit,
}

/// Upper bound for `settlement.expire_after_hours` (ten years)
pub const MAX_EXPIRE_AFTER_HOURS: u64 = 10 * 365 * 24;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub default_multiplier: u64,
    pub max_multiplier: u64,
    /// Page size used while scanning pending wagers
    pub scan_page_size: usize,
    pub stale_wager_policy: StaleWagerPolicy,
    pub expire_after_hours: u64,
    pub max_commit_attempts: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            default_multiplier: 80,
            max_multiplier: 1_000,
            scan_page_size: 256,
            stale_wager_policy: StaleWagerPolicy::Refund,
            expire_after_hours: 48,
            max_commit_attempts: 5,
        }
    }
}

impl SettlementConfig {
    pub fn expire_after(&self) -> Option<chrono::Duration> {
        match self.stale_wager_policy {
            StaleWagerPolicy::Keep => None,
            _ => i64::try_from(self.expire_after_hours)
                .ok()
                .and_then(chrono::Duration::try_hours),
        }
    }
}

/// HTTP surface configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_filter: "twod_ledger=info,tower_http=info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// In-memory store and verbose logging for local runs
    pub fn development() -> Self {
        Self {
            storage: StorageConfig {
                backend: StoreBackend::Memory,
                clear_on_start: true,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_filter: "twod_ledger=debug,tower_http=debug".to_string(),
            },
            ..Default::default()
        }
    }

    /// Persistent RocksDB store with production tuning
    pub fn production() -> Self {
        Self {
            storage: StorageConfig {
                backend: StoreBackend::Rocks,
                data_directory: "./DB/ledger_data".to_string(),
                write_buffer_size_mb: 128,
                max_write_buffer_number: 6,
                compression_type: CompressionType::Lz4,
                clear_on_start: false,
            },
            api: ApiConfig {
                allowed_origins: vec![],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.betting.min_stake == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "betting.min_stake must be > 0".to_string(),
            ));
        }
        if self.betting.min_stake > self.betting.max_stake {
            return Err(ConfigValidationError::LogicalInconsistency(format!(
                "betting.min_stake {} exceeds betting.max_stake {}",
                self.betting.min_stake, self.betting.max_stake
            )));
        }
        if self.betting.max_commit_attempts == 0 || self.settlement.max_commit_attempts == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "max_commit_attempts must be > 0".to_string(),
            ));
        }
        if self.settlement.max_multiplier == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "settlement.max_multiplier must be > 0".to_string(),
            ));
        }
        if self.settlement.default_multiplier == 0
            || self.settlement.default_multiplier > self.settlement.max_multiplier
        {
            return Err(ConfigValidationError::LogicalInconsistency(format!(
                "settlement.default_multiplier {} must be within 1..={}",
                self.settlement.default_multiplier, self.settlement.max_multiplier
            )));
        }
        if self.settlement.scan_page_size == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "settlement.scan_page_size must be > 0".to_string(),
            ));
        }
        if self.settlement.stale_wager_policy != StaleWagerPolicy::Keep
            && self.settlement.expire_after_hours == 0
        {
            return Err(ConfigValidationError::InvalidValue(
                "settlement.expire_after_hours must be > 0 unless the stale policy is keep"
                    .to_string(),
            ));
        }
        if self.settlement.expire_after_hours > MAX_EXPIRE_AFTER_HOURS {
            return Err(ConfigValidationError::InvalidValue(format!(
                "settlement.expire_after_hours {} exceeds {}",
                self.settlement.expire_after_hours, MAX_EXPIRE_AFTER_HOURS
            )));
        }

        // Offsets beyond ±18h are not valid time zones
        if self.session.utc_offset_minutes.abs() >= 18 * 60 {
            return Err(ConfigValidationError::InvalidValue(format!(
                "session.utc_offset_minutes {} out of range",
                self.session.utc_offset_minutes
            )));
        }

        let boundary = SessionConfig::parse_time("session.session_boundary", &self.session.session_boundary)?;
        let morning = SessionConfig::parse_time("session.morning_cutoff", &self.session.morning_cutoff)?;
        let evening = SessionConfig::parse_time("session.evening_cutoff", &self.session.evening_cutoff)?;

        if morning > boundary || boundary > evening {
            return Err(ConfigValidationError::LogicalInconsistency(format!(
                "expected morning_cutoff <= session_boundary <= evening_cutoff, got {} / {} / {}",
                morning, boundary, evening
            )));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    InvalidValue(String),
    LogicalInconsistency(String),
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValidationError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
            ConfigValidationError::LogicalInconsistency(msg) => write!(f, "Configuration logical inconsistency: {}", msg),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

impl From<ConfigValidationError> for ConfigurationError {
    fn from(e: ConfigValidationError) -> Self {
        ConfigurationError::ValidationFailed(e.to_string())
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> LedgerResult<LedgerConfig> {
        self.load_with(|name| std::env::var(name).ok())
    }

    /// Same as [`ConfigLoader::load`] with an explicit variable lookup
    pub fn load_with<F>(&self, lookup: F) -> LedgerResult<LedgerConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => LedgerConfig::default(),
        };

        Self::apply_overrides(&mut config, lookup)?;

        config.validate().map_err(ConfigurationError::from)?;

        Ok(config)
    }

    /// Load configuration from TOML file
    fn load_from_file(path: &str) -> LedgerResult<LedgerConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_overrides<F>(config: &mut LedgerConfig, lookup: F) -> LedgerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("TWOD_DATA_DIR") {
            config.storage.data_directory = dir;
        }
        if let Some(backend) = lookup("TWOD_STORE_BACKEND") {
            config.storage.backend = match backend.to_lowercase().as_str() {
                "rocks" | "rocksdb" => StoreBackend::Rocks,
                "memory" => StoreBackend::Memory,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "TWOD_STORE_BACKEND".to_string(),
                        value: backend,
                        reason: "Expected 'rocks' or 'memory'".to_string(),
                    }
                    .into())
                }
            };
        }
        if let Some(host) = lookup("TWOD_API_HOST") {
            config.api.host = host;
        }
        if let Some(port) = lookup("TWOD_API_PORT") {
            config.api.port = parse_var("TWOD_API_PORT", port, "Invalid port number")?;
        }
        if let Some(offset) = lookup("TWOD_UTC_OFFSET_MINUTES") {
            config.session.utc_offset_minutes =
                parse_var("TWOD_UTC_OFFSET_MINUTES", offset, "Invalid minute offset")?;
        }
        if let Some(min) = lookup("TWOD_MIN_STAKE") {
            config.betting.min_stake = parse_var("TWOD_MIN_STAKE", min, "Invalid amount")?;
        }
        if let Some(max) = lookup("TWOD_MAX_STAKE") {
            config.betting.max_stake = parse_var("TWOD_MAX_STAKE", max, "Invalid amount")?;
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(field: &str, value: String, reason: &str) -> LedgerResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        assert!(LedgerConfig::default().validate().is_ok());
        assert!(LedgerConfig::development().validate().is_ok());
        assert!(LedgerConfig::production().validate().is_ok());
    }

    #[test]
    fn test_stake_bounds_validation() {
        let mut config = LedgerConfig::default();
        config.betting.min_stake = 500;
        config.betting.max_stake = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_time_validation() {
        let mut config = LedgerConfig::default();
        config.session.morning_cutoff = "25:99".to_string();
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.session.morning_cutoff = "13:00".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LedgerConfig = toml::from_str(
            r#"
            [betting]
            min_stake = 50

            [settlement]
            stale_wager_policy = "forfeit"
            "#,
        )
        .unwrap();

        assert_eq!(config.betting.min_stake, 50);
        assert_eq!(config.betting.max_stake, 100_000);
        assert_eq!(config.settlement.stale_wager_policy, StaleWagerPolicy::Forfeit);
        assert_eq!(config.session.morning_cutoff, "11:45");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [("TWOD_API_PORT", "9090"), ("TWOD_STORE_BACKEND", "memory")]
            .into_iter()
            .collect();
        let config = ConfigLoader::new()
            .load_with(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api.port, 9090);
        assert_eq!(config.storage.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_invalid_env_override() {
        let result = ConfigLoader::new().load_with(|name| {
            (name == "TWOD_API_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_expiry_disabled_for_keep_policy() {
        let mut config = SettlementConfig::default();
        assert_eq!(config.expire_after(), Some(chrono::Duration::hours(48)));
        config.stale_wager_policy = StaleWagerPolicy::Keep;
        assert_eq!(config.expire_after(), None);
    }

    #[test]
    fn test_expiry_window_is_bounded() {
        let mut config = LedgerConfig::default();
        config.settlement.expire_after_hours = 10_000_000_000_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue(_))
        ));
        // Out-of-range durations never panic
        assert_eq!(config.settlement.expire_after(), None);

        config.settlement.expire_after_hours = MAX_EXPIRE_AFTER_HOURS;
        assert!(config.validate().is_ok());
        assert!(config.settlement.expire_after().is_some());
    }
}
