//! # Configuration Management
//!
//! Centralized configuration for a node: listener, keepalive, framing limits,
//! discovery seeds and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! Durations are written in milliseconds.

use crate::error::{ProtocolError, Result};
use crate::protocol::peer::NodeId;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max allowed frame payload (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Listen port used when none is configured
pub const DEFAULT_LISTEN_PORT: u16 = 7777;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Listener and keepalive settings
    #[serde(default)]
    pub node: NodeConfig,

    /// Seed bootstrap and peer refresh
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Framing and connection limits
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("ZENO_LISTEN_ADDR") {
            config.node.listen_addr = addr;
        }

        if let Ok(port) = std::env::var("ZENO_LISTEN_PORT") {
            config.node.listen_port = port.parse::<u16>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid ZENO_LISTEN_PORT: {port}"))
            })?;
        }

        if let Ok(interval) = std::env::var("ZENO_KEEPALIVE_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.node.keepalive_interval = Duration::from_millis(val);
            }
        }

        if let Ok(seeds) = std::env::var("ZENO_SEEDS") {
            config.discovery.seeds = seeds
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
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
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.node.validate());
        errors.extend(self.discovery.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener and per-connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Address the listener binds to (e.g., "0.0.0.0")
    pub listen_addr: String,

    /// Port the listener binds to and that outbound handshakes announce.
    /// Zero binds an ephemeral port; the bound port is then announced.
    pub listen_port: u16,

    /// Idle interval after which a forwarder writes a keepalive frame
    #[serde(with = "duration_serde")]
    pub keepalive_interval: Duration,

    /// Timeout for the listener to stop during shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: String::from("0.0.0.0"),
            listen_port: DEFAULT_LISTEN_PORT,
            keepalive_interval: timeout::KEEPALIVE_INTERVAL,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl NodeConfig {
    /// Validate node configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.listen_addr.is_empty() {
            errors.push("Listen address cannot be empty".to_string());
        } else if self.listen_addr.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid listen address: '{}' (expected an IP such as '0.0.0.0')",
                self.listen_addr
            ));
        }

        if self.keepalive_interval.as_millis() < 10 {
            errors.push("Keepalive interval too short (minimum: 10ms)".to_string());
        } else if self.keepalive_interval.as_secs() > 3600 {
            errors.push("Keepalive interval too long (maximum: 1 hour)".to_string());
        }

        if self.shutdown_timeout.as_millis() < 100 {
            errors.push("Shutdown timeout too short (minimum: 100ms)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }

    /// The `address:port` the listener binds to
    pub fn bind_address(&self) -> String {
        if self.listen_addr.contains(':') {
            format!("[{}]:{}", self.listen_addr, self.listen_port)
        } else {
            format!("{}:{}", self.listen_addr, self.listen_port)
        }
    }
}

/// Seed bootstrap and periodic peer refresh
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Seed nodes as "address:port"
    pub seeds: Vec<String>,

    /// Interval between GetPeers requests to every seed
    #[serde(with = "duration_serde")]
    pub refresh_interval: Duration,

    /// Bound for a single bootstrap attempt against one seed
    #[serde(with = "duration_serde")]
    pub attempt_timeout: Duration,

    /// Bootstrap rounds over the seed list before giving up
    pub max_attempts: u32,

    /// Delay before the second bootstrap round
    #[serde(with = "duration_serde")]
    pub initial_backoff: Duration,

    /// Upper bound for the doubling backoff
    #[serde(with = "duration_serde")]
    pub max_backoff: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            refresh_interval: timeout::PEER_REFRESH_INTERVAL,
            attempt_timeout: timeout::DISCOVERY_ATTEMPT_TIMEOUT,
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl DiscoveryConfig {
    /// Validate discovery configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for seed in &self.seeds {
            if seed.parse::<NodeId>().is_err() {
                errors.push(format!(
                    "Invalid seed: '{seed}' (expected format: 'host:port')"
                ));
            }
        }

        if self.refresh_interval.as_secs() < 1 {
            errors.push("Peer refresh interval too short (minimum: 1s)".to_string());
        }

        if self.attempt_timeout.as_millis() < 100 {
            errors.push("Discovery attempt timeout too short (minimum: 100ms)".to_string());
        }

        if self.max_attempts == 0 {
            errors.push("Discovery max attempts must be greater than 0".to_string());
        }

        if self.initial_backoff > self.max_backoff {
            errors.push("Initial backoff cannot exceed max backoff".to_string());
        }

        errors
    }

    /// Parsed seed list; invalid entries are reported by `validate()`
    pub fn seed_ids(&self) -> Vec<NodeId> {
        self.seeds.iter().filter_map(|s| s.parse().ok()).collect()
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Maximum allowed frame payload size in bytes
    pub max_frame_size: usize,

    /// Timeout for outbound connection attempts
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Disable Nagle's algorithm on peer sockets
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            connect_timeout: timeout::CONNECT_TIMEOUT,
            nodelay: true,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size < 1024 {
            errors.push("Max frame size too small (minimum: 1 KB)".to_string());
        } else if self.max_frame_size > u32::MAX as usize {
            errors.push(format!(
                "Max frame size too large: {} bytes (length field is 32 bits)",
                self.max_frame_size
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
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
            app_name: String::from("zeno-net"),
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
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
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
