//! Configuration loading and typed config structures for the Rewind server.
//!
//! The canonical configuration lives in `rewind-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads and validates the file.
//!
//! Hit radius and tick period depend on the units a deployment uses, so
//! neither is a constant anywhere else in the workspace.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
///
/// Mirrors the structure of `rewind-config.yaml`. Every field has a
/// default, so an empty file (or no file) yields a runnable server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RewindConfig {
    /// Listener and per-session I/O settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Motion simulator settings.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Position history retention.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Hit resolution parameters.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Clock synchronization protocol.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Optional durable mirror of the history.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RewindConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `REDIS_URL` overrides `store.url`
    /// - `REWIND_HOST` overrides `server.host`
    /// - `REWIND_PORT` overrides `server.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply env overrides, and
    /// validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `REWIND_PORT` is not a port number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("REDIS_URL") {
            self.store.url = Some(val);
        }
        if let Ok(val) = std::env::var("REWIND_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("REWIND_PORT") {
            self.server.port = val.parse().map_err(|e| ConfigError::Invalid {
                reason: format!("REWIND_PORT is not a valid port: {e}"),
            })?;
        }
        Ok(())
    }

    /// Check cross-field and range constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulation.validate()?;
        self.resolver.validate()?;
        if self.history.retention == 0 {
            return Err(invalid("history.retention must be at least 1"));
        }
        if self.server.write_timeout_ms == 0 {
            return Err(invalid("server.write_timeout_ms must be at least 1"));
        }
        if self.store.timeout_ms == 0 {
            return Err(invalid("store.timeout_ms must be at least 1"));
        }
        if self.store.key.is_empty() {
            return Err(invalid("store.key must not be empty"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

/// Listener and per-session I/O configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on a single `WebSocket` write before the session is
    /// considered stuck and dropped.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl ServerSettings {
    /// Per-write timeout as a [`Duration`].
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

/// Motion simulator configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Nominal tick period in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Travel speed along the primary axis, arena units per second.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Seed for the secondary-axis random source. `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Arena bounds.
    #[serde(default)]
    pub arena: ArenaConfig,
}

impl SimulationConfig {
    /// Nominal tick period as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(invalid("simulation.tick_interval_ms must be at least 1"));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(invalid("simulation.speed must be a finite, non-negative number"));
        }
        self.arena.validate()
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            speed: default_speed(),
            seed: None,
            arena: ArenaConfig::default(),
        }
    }
}

/// Rectangular arena the entity moves in.
///
/// The entity travels along x, sits at a fixed `height` on y, and picks a
/// new z lane whenever it turns around.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArenaConfig {
    /// Lower bound of the primary axis.
    #[serde(default = "default_min_x")]
    pub min_x: f64,
    /// Upper bound of the primary axis.
    #[serde(default = "default_max_x")]
    pub max_x: f64,
    /// Lower bound of the secondary axis.
    #[serde(default = "default_min_z")]
    pub min_z: f64,
    /// Upper bound of the secondary axis.
    #[serde(default = "default_max_z")]
    pub max_z: f64,
    /// Fixed vertical coordinate.
    #[serde(default = "default_height")]
    pub height: f64,
}

impl ArenaConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.min_x, self.max_x, self.min_z, self.max_z, self.height];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(invalid("simulation.arena bounds must be finite"));
        }
        if self.min_x >= self.max_x {
            return Err(invalid("simulation.arena.min_x must be below max_x"));
        }
        if self.min_z > self.max_z {
            return Err(invalid("simulation.arena.min_z must not exceed max_z"));
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            min_x: default_min_x(),
            max_x: default_max_x(),
            min_z: default_min_z(),
            max_z: default_max_z(),
            height: default_height(),
        }
    }
}

/// Position history configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of entries retained (K).
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
        }
    }
}

/// Hit resolution configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResolverConfig {
    /// A shot hits when the rewound distance is strictly below this.
    #[serde(default = "default_hit_radius")]
    pub hit_radius: f64,

    /// Time window when the client asks for compensation.
    #[serde(default = "default_compensated_window_ms")]
    pub compensated_window_ms: i64,

    /// Time window when the client opts out of compensation.
    #[serde(default = "default_uncompensated_window_ms")]
    pub uncompensated_window_ms: i64,

    /// Treat matches further than the window from the target time as misses.
    #[serde(default = "default_enforce_window")]
    pub enforce_window: bool,
}

impl ResolverConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.hit_radius.is_finite() || self.hit_radius <= 0.0 {
            return Err(invalid("resolver.hit_radius must be a positive number"));
        }
        if self.compensated_window_ms < 0 || self.uncompensated_window_ms < 0 {
            return Err(invalid("resolver windows must not be negative"));
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            hit_radius: default_hit_radius(),
            compensated_window_ms: default_compensated_window_ms(),
            uncompensated_window_ms: default_uncompensated_window_ms(),
            enforce_window: default_enforce_window(),
        }
    }
}

/// Which clock exchange the server answers `sync` with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Reply with receive and send times; the client computes the offset.
    #[default]
    FourTimestamp,
    /// Reply with a single server time and record `serverNow - t0` as the
    /// session offset. Ignores server processing delay.
    TwoTimestamp,
}

/// Clock synchronization configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SyncConfig {
    /// Exchange variant.
    #[serde(default)]
    pub mode: SyncMode,
}

/// Durable history mirror configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Redis-compatible URL. `None` keeps history in memory only.
    #[serde(default)]
    pub url: Option<String>,

    /// Sorted-set key holding the stream.
    #[serde(default = "default_store_key")]
    pub key: String,

    /// Upper bound on any single store call.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

impl StoreConfig {
    /// Per-call timeout as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: default_store_key(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// =============================================================================
// Defaults
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

const fn default_write_timeout_ms() -> u64 {
    250
}

const fn default_tick_interval_ms() -> u64 {
    25
}

const fn default_speed() -> f64 {
    8.0
}

const fn default_min_x() -> f64 {
    -20.0
}

const fn default_max_x() -> f64 {
    20.0
}

const fn default_min_z() -> f64 {
    -20.0
}

const fn default_max_z() -> f64 {
    20.0
}

const fn default_height() -> f64 {
    1.0
}

const fn default_retention() -> usize {
    100
}

const fn default_hit_radius() -> f64 {
    1.0
}

const fn default_compensated_window_ms() -> i64 {
    200
}

const fn default_uncompensated_window_ms() -> i64 {
    10
}

const fn default_enforce_window() -> bool {
    true
}

fn default_store_key() -> String {
    "target:positions".to_owned()
}

const fn default_store_timeout_ms() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".to_owned()
}
