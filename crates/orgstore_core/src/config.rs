//! Process configuration.
//!
//! # Responsibility
//! - Describe storage, logging and event settings as one explicit value.
//! - Load that value from JSON text or from `ORGSTORE_*` environment variables.
//!
//! # Invariants
//! - Every section has a usable default; an empty source yields `Config::default()`.
//! - Configuration is constructed once by the caller and passed by reference.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "ORGSTORE_";

pub const DEFAULT_EXCHANGE: &str = "domain.events";
pub const DEFAULT_CREATED_ROUTING_KEY: &str = "organization.created";
pub const DEFAULT_UPDATED_ROUTING_KEY: &str = "organization.updated";
pub const DEFAULT_DELETED_ROUTING_KEY: &str = "organization.deleted";
pub const DEFAULT_SCHEMA_VERSION: &str = "1";

/// Root configuration value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub events: EventsConfig,
}

/// Storage adapter selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database file. `None` opens an in-memory database.
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_path: None,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute log directory. `None` leaves logging to the caller.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: if cfg!(debug_assertions) { "debug" } else { "info" }.to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    pub exchange: String,
    pub routing_keys: RoutingKeys,
    pub schema_version: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            routing_keys: RoutingKeys::default(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingKeys {
    pub created: String,
    pub updated: String,
    pub deleted: String,
}

impl Default for RoutingKeys {
    fn default() -> Self {
        Self {
            created: DEFAULT_CREATED_ROUTING_KEY.to_string(),
            updated: DEFAULT_UPDATED_ROUTING_KEY.to_string(),
            deleted: DEFAULT_DELETED_ROUTING_KEY.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Json(serde_json::Error),
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid configuration document: {err}"),
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "invalid value `{value}` for `{key}`; expected {expected}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl Config {
    /// Parses a JSON document; missing keys keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads `ORGSTORE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from defaults overlaid with values returned by `lookup`.
    ///
    /// Blank values are ignored. `DB_CONNECTION` is accepted as an alias for
    /// `ORGSTORE_DATABASE_PATH` when the latter is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_lookup(&lookup)?;
        Ok(config)
    }

    fn apply_lookup(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let read = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = read("STORAGE_BACKEND") {
            self.storage.backend =
                StorageBackend::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                    key: format!("{ENV_PREFIX}STORAGE_BACKEND"),
                    value,
                    expected: "memory|sqlite",
                })?;
        }

        let database_path = read("DATABASE_PATH").or_else(|| {
            lookup("DB_CONNECTION")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        });
        if let Some(path) = database_path {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(value) = read("BUSY_TIMEOUT_MS") {
            self.storage.busy_timeout_ms =
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: format!("{ENV_PREFIX}BUSY_TIMEOUT_MS"),
                    value,
                    expected: "milliseconds as an unsigned integer",
                })?;
        }

        if let Some(level) = read("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(directory) = read("LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(directory));
        }

        if let Some(exchange) = read("EVENTS_EXCHANGE") {
            self.events.exchange = exchange;
        }
        if let Some(key) = read("EVENTS_ROUTING_KEY_CREATED") {
            self.events.routing_keys.created = key;
        }
        if let Some(key) = read("EVENTS_ROUTING_KEY_UPDATED") {
            self.events.routing_keys.updated = key;
        }
        if let Some(key) = read("EVENTS_ROUTING_KEY_DELETED") {
            self.events.routing_keys.deleted = key;
        }
        if let Some(version) = read("EVENTS_SCHEMA_VERSION") {
            self.events.schema_version = version;
        }

        Ok(())
    }
}
