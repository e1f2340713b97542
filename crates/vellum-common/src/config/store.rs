//! Document store configuration.
//!
//! This module provides configuration management for a document store:
//! connection settings, Hi/Lo defaults and session behaviour.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_HILO_INCREMENT, DEFAULT_HILO_MAX_LO};
use crate::error::{VellumError, VellumResult};

/// Hi/Lo block settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiloSettings {
    /// Ids handed out per reserved hi block.
    #[serde(default = "default_max_lo")]
    pub max_lo: i32,

    /// Amount the shared hi counter advances per reservation.
    #[serde(default = "default_increment")]
    pub increment: i32,
}

impl Default for HiloSettings {
    fn default() -> Self {
        Self {
            max_lo: default_max_lo(),
            increment: default_increment(),
        }
    }
}

impl HiloSettings {
    /// Creates settings with the given block size.
    pub fn with_max_lo(max_lo: i32) -> Self {
        Self {
            max_lo,
            ..Default::default()
        }
    }

    /// Validates the settings.
    pub fn validate(&self) -> VellumResult<()> {
        if self.max_lo <= 0 {
            return Err(VellumError::invalid_config("hilo.max_lo must be greater than 0"));
        }
        if self.increment <= 0 {
            return Err(VellumError::invalid_config("hilo.increment must be greater than 0"));
        }
        Ok(())
    }
}

/// Which identity map new sessions use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMapKind {
    /// One instance per (type, id), snapshot based change tracking.
    #[default]
    Tracking,
    /// No caching; every load hydrates a fresh instance.
    Null,
}

/// Document store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection string.
    #[serde(default)]
    pub connection_string: String,

    /// Default Hi/Lo settings for every sequence.
    #[serde(default)]
    pub hilo: HiloSettings,

    /// Identity map used by `open_session`.
    #[serde(default)]
    pub identity_map: IdentityMapKind,

    /// Command timeout in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Log emitted SQL at debug level.
    #[serde(default)]
    pub log_sql: bool,
}

fn default_max_lo() -> i32 {
    DEFAULT_HILO_MAX_LO
}

fn default_increment() -> i32 {
    DEFAULT_HILO_INCREMENT
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            hilo: HiloSettings::default(),
            identity_map: IdentityMapKind::default(),
            command_timeout_secs: default_command_timeout(),
            log_sql: false,
        }
    }
}

impl StoreConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> VellumResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> VellumResult<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to TOML string.
    pub fn to_toml(&self) -> VellumResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> VellumResult<()> {
        self.hilo.validate()?;
        if self.command_timeout_secs == 0 {
            return Err(VellumError::invalid_config(
                "command_timeout_secs must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Validates that a database connection can be attempted.
    pub fn validate_connection(&self) -> VellumResult<()> {
        self.validate()?;
        if self.connection_string.trim().is_empty() {
            return Err(VellumError::invalid_config("connection_string is empty"));
        }
        Ok(())
    }

    /// Creates a builder for configuration.
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::new()
    }
}

/// Builder for store configuration.
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connection string.
    pub fn connection_string(mut self, conn: impl Into<String>) -> Self {
        self.config.connection_string = conn.into();
        self
    }

    /// Sets the Hi/Lo block size.
    pub fn hilo_max_lo(mut self, max_lo: i32) -> Self {
        self.config.hilo.max_lo = max_lo;
        self
    }

    /// Sets the Hi/Lo counter increment.
    pub fn hilo_increment(mut self, increment: i32) -> Self {
        self.config.hilo.increment = increment;
        self
    }

    /// Sets the default identity map.
    pub fn identity_map(mut self, kind: IdentityMapKind) -> Self {
        self.config.identity_map = kind;
        self
    }

    /// Sets the command timeout in seconds.
    pub fn command_timeout_secs(mut self, secs: u64) -> Self {
        self.config.command_timeout_secs = secs;
        self
    }

    /// Enables SQL logging.
    pub fn log_sql(mut self, enabled: bool) -> Self {
        self.config.log_sql = enabled;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> StoreConfig {
        self.config
    }
}
