//! # Configuration Management
//!
//! Centralized configuration for the NSCA client.
//!
//! This module describes where alerts go (the channel), how they are
//! dispatched (the worker pool), an optional startup alert, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides (`NSCA_*`)
//!
//! Keys from classic `nsca_send` property files (`nscaHost`, `nscaPort`,
//! `nscaService`, `encryption_method`, `password`) are accepted as aliases in
//! the `[channel]` table.

use crate::error::{ProtocolError, Result};
use crate::protocol::message::Severity;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default NSCA daemon port
pub const DEFAULT_PORT: u16 = 5667;

/// Service name reported when none is configured
pub const DEFAULT_SERVICE_NAME: &str = "UNSPECIFIED_SERVICE";

/// Default number of always-running delivery workers
pub const DEFAULT_CORE_WORKERS: usize = 50;

/// Default upper bound on delivery workers
pub const DEFAULT_MAX_WORKERS: usize = 50;

/// Default capacity of the pending-send queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 2000;

/// Default capacity of the redelivery buffer
pub const DEFAULT_REDELIVERY_CAPACITY: usize = 100;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NscaConfig {
    /// Destination daemon and packet settings
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Delivery worker pool
    #[serde(default)]
    pub pool: PoolConfig,

    /// Alert sent once when a client starts
    #[serde(default)]
    pub startup: StartupConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NscaConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| {
            ProtocolError::InvalidConfiguration(format!("Failed to open config file: {e}"))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            ProtocolError::InvalidConfiguration(format!("Failed to read config file: {e}"))
        })?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::InvalidConfiguration(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `NSCA_*` environment variables.
    ///
    /// Unparseable numeric values are reported rather than ignored.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("NSCA_HOST") {
            self.channel.host = host;
        }

        if let Some(port) = env_number::<u16>("NSCA_PORT")? {
            self.channel.port = port;
        }

        if let Ok(service) = std::env::var("NSCA_SERVICE") {
            self.channel.service_name = service;
        }

        if let Some(method) = env_number::<i64>("NSCA_OBFUSCATION_METHOD")? {
            self.channel.obfuscation_method = method;
        }

        if let Ok(secret) = std::env::var("NSCA_SHARED_SECRET") {
            self.channel.shared_secret = secret;
        }

        if let Ok(host) = std::env::var("NSCA_REPORTING_HOST") {
            self.channel.reporting_host = Some(host);
        }

        if let Some(ms) = env_number::<u64>("NSCA_SOCKET_TIMEOUT_MS")? {
            self.channel.socket_timeout = Duration::from_millis(ms);
        }

        if let Some(workers) = env_number::<usize>("NSCA_CORE_WORKERS")? {
            self.pool.core_workers = workers;
        }

        if let Some(workers) = env_number::<usize>("NSCA_MAX_WORKERS")? {
            self.pool.max_workers = workers;
        }

        if let Some(capacity) = env_number::<usize>("NSCA_QUEUE_CAPACITY")? {
            self.pool.queue_capacity = capacity;
        }

        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            ProtocolError::InvalidConfiguration(format!("Failed to serialize config: {e}"))
        })?;

        std::fs::write(path, content).map_err(|e| {
            ProtocolError::InvalidConfiguration(format!("Failed to write config file: {e}"))
        })?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.channel.validate());
        errors.extend(self.pool.validate());
        errors.extend(self.startup.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::InvalidConfiguration(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ProtocolError::InvalidConfiguration(format!("{name} is not a valid number: '{raw}'"))
        }),
        Err(_) => Ok(None),
    }
}

/// Destination and packet settings for one channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// NSCA daemon host name or address
    #[serde(alias = "nscaHost")]
    pub host: String,

    /// NSCA daemon port
    #[serde(alias = "nscaPort")]
    pub port: u16,

    /// Nagios service description the alerts belong to
    #[serde(alias = "nscaService")]
    pub service_name: String,

    /// 0 = none, 1 = XOR; anything else fails channel construction
    #[serde(alias = "encryption_method")]
    pub obfuscation_method: i64,

    /// Secret mixed into the XOR pass (ignored when empty)
    #[serde(alias = "password")]
    pub shared_secret: String,

    /// Reported host name; resolved from the local route when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_host: Option<String>,

    /// Timeout applied to each connect, handshake read and write
    #[serde(with = "duration_serde")]
    pub socket_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: DEFAULT_PORT,
            service_name: String::from(DEFAULT_SERVICE_NAME),
            obfuscation_method: 0,
            shared_secret: String::new(),
            reporting_host: None,
            socket_timeout: timeout::DEFAULT_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    /// Validate channel configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Target host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Target port must be greater than 0".to_string());
        }

        if self.service_name.trim().is_empty() {
            errors.push("Service name cannot be empty".to_string());
        } else if self.service_name.trim().len() > 128 {
            errors.push(format!(
                "Service name too long: {} bytes (maximum: 128)",
                self.service_name.trim().len()
            ));
        }

        if !matches!(self.obfuscation_method, 0 | 1) {
            errors.push(format!(
                "Unsupported obfuscation method: {} (valid: 0 = none, 1 = xor)",
                self.obfuscation_method
            ));
        }

        if self.socket_timeout.as_millis() < 10 {
            errors.push("Socket timeout too short (minimum: 10ms)".to_string());
        } else if self.socket_timeout.as_secs() > 300 {
            errors.push("Socket timeout too long (maximum: 300s)".to_string());
        }

        errors
    }
}

/// Delivery worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers started with the dispatcher and kept for its lifetime
    pub core_workers: usize,

    /// Upper bound on workers, including extras spawned when the queue fills
    pub max_workers: usize,

    /// Pending sends held before submissions are rejected
    pub queue_capacity: usize,

    /// Idle time after which an extra worker exits
    #[serde(with = "duration_serde")]
    pub worker_keep_alive: Duration,

    /// Replay of submissions rejected by a full queue
    pub redelivery: RedeliveryConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_workers: DEFAULT_CORE_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_keep_alive: timeout::WORKER_KEEP_ALIVE,
            redelivery: RedeliveryConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.core_workers == 0 {
            errors.push("Core workers must be greater than 0".to_string());
        }

        if self.max_workers < self.core_workers {
            errors.push(format!(
                "Max workers ({}) cannot be less than core workers ({})",
                self.max_workers, self.core_workers
            ));
        } else if self.max_workers > 10_000 {
            errors.push(format!(
                "Max workers very high: {} (maximum: 10,000)",
                self.max_workers
            ));
        }

        if self.queue_capacity == 0 {
            errors.push("Queue capacity must be greater than 0".to_string());
        } else if self.queue_capacity > 1_000_000 {
            errors.push(format!(
                "Queue capacity too large: {} (max recommended: 1,000,000)",
                self.queue_capacity
            ));
        }

        if self.worker_keep_alive.as_millis() < 10 {
            errors.push("Worker keep-alive too short (minimum: 10ms)".to_string());
        }

        errors.extend(self.redelivery.validate());
        errors
    }
}

/// Best-effort replay of alerts rejected by a saturated queue
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedeliveryConfig {
    pub enabled: bool,

    /// Alerts held at most; further rejections are dropped
    pub capacity: usize,

    /// Pause between flushes while the buffer holds alerts
    #[serde(with = "duration_serde")]
    pub flush_interval: Duration,

    /// Pause between checks while the buffer is empty
    #[serde(with = "duration_serde")]
    pub idle_interval: Duration,

    /// Consecutive empty checks before the reaper task exits
    pub max_idle_passes: u32,
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: DEFAULT_REDELIVERY_CAPACITY,
            flush_interval: timeout::REDELIVERY_FLUSH_INTERVAL,
            idle_interval: timeout::REDELIVERY_IDLE_INTERVAL,
            max_idle_passes: 10,
        }
    }
}

impl RedeliveryConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.enabled {
            return errors;
        }

        if self.capacity == 0 {
            errors.push("Redelivery capacity must be greater than 0 when enabled".to_string());
        }

        if self.flush_interval.is_zero() || self.idle_interval.is_zero() {
            errors.push("Redelivery intervals must be greater than 0".to_string());
        }

        if self.max_idle_passes == 0 {
            errors.push("Redelivery max idle passes must be greater than 0".to_string());
        }

        errors
    }
}

/// Alert sent once by `NscaClient::start`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Message text; no alert is sent when absent or empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub severity: Severity,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            message: None,
            severity: Severity::Ok,
        }
    }
}

impl StartupConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(message) = &self.message {
            if message.len() > 512 {
                errors.push(format!(
                    "WARNING: Startup message is {} bytes and will be truncated to 512",
                    message.len()
                ));
            }
        }
        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("nsca-protocol"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_ascii_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
