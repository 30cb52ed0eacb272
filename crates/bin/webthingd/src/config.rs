//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `webthing.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use serde::Deserialize;

use webthing_domain::storage::{DEFAULT_ACTIONS_MAX, DEFAULT_EVENTS_MAX, StorageConfig};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// History capacities.
    pub storage: StorageSection,
    /// Message bus settings.
    pub bus: BusConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// `[storage.actions]` and `[storage.events]`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Per-name action history.
    pub actions: HistoryConfig<DEFAULT_ACTIONS_MAX>,
    /// Event history.
    pub events: HistoryConfig<DEFAULT_EVENTS_MAX>,
}

/// Capacity of one history store, `DEFAULT` when not configured.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default = "Default::default")]
pub struct HistoryConfig<const DEFAULT: usize> {
    pub max_size: usize,
}

/// In-process message bus configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// How far a subscriber may lag before messages are dropped.
    pub capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `webthing.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// capacity is zero.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("webthing.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(max_size) = parse_env("WEBTHING_ACTIONS_MAX") {
            self.storage.actions.max_size = max_size;
        }
        if let Some(max_size) = parse_env("WEBTHING_EVENTS_MAX") {
            self.storage.events.max_size = max_size;
        }
        if let Some(capacity) = parse_env("WEBTHING_BUS_CAPACITY") {
            self.bus.capacity = capacity;
        }
        if let Ok(val) = std::env::var("WEBTHING_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.actions.max_size == 0 {
            return Err(ConfigError::Validation(
                "storage.actions.max_size must be non-zero".to_string(),
            ));
        }
        if self.storage.events.max_size == 0 {
            return Err(ConfigError::Validation(
                "storage.events.max_size must be non-zero".to_string(),
            ));
        }
        if self.bus.capacity == 0 {
            return Err(ConfigError::Validation(
                "bus.capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn action_storage(&self) -> StorageConfig {
        StorageConfig::bounded(self.storage.actions.max_size)
    }

    #[must_use]
    pub fn event_storage(&self) -> StorageConfig {
        StorageConfig::bounded(self.storage.events.max_size)
    }
}

fn parse_env(key: &str) -> Option<usize> {
    let val = std::env::var(key).ok()?;
    match val.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %val, "ignoring non-numeric environment override");
            None
        }
    }
}

impl<const DEFAULT: usize> Default for HistoryConfig<DEFAULT> {
    fn default() -> Self {
        Self { max_size: DEFAULT }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "webthingd=info,webthing=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
