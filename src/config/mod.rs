//! Configuration management for blockfix
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use blockfix::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `BLOCKFIX__<section>__<key>`
//!
//! Examples:
//! - `BLOCKFIX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `BLOCKFIX__REPAIR__MAX_FIX_TIME=2h`
//! - `BLOCKFIX__STORAGE__PROVIDER=memory`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/blockfix.toml`.
//! This can be overridden using the `BLOCKFIX_CONFIG` environment variable.
//!
//! # Job configuration
//!
//! [`Config::job_conf`] projects the repair settings onto the string keys
//! every submitted job inherits.

mod models;
mod sources;
mod validation;

pub use crate::humanize::Millis;
pub use models::{
    Config, EngineConfig, RepairConfig, ServerConfig, StorageConfig, StorageProvider,
    TelemetryConfig,
};
pub use sources::config_path;
pub use validation::ValidationError;

use thiserror::Error;

use crate::codec::CodecRegistry;
use crate::conf::{JobConf, keys};
use crate::repair::Worker;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`BLOCKFIX__*`)
    /// 2. TOML file (default: `config/blockfix.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Base job configuration shared by every repair job
    pub fn job_conf(&self) -> JobConf {
        let mut conf = JobConf::new();
        conf.set(
            keys::MAX_FIX_TIME_FOR_FILE,
            self.repair.max_fix_time.as_u64().to_string(),
        )
        .set(keys::CODECS_JSON, CodecRegistry::to_conf_value(&self.codecs));
        if let Some(reconstructor) = self.repair.reconstructor() {
            conf.set(keys::RECONSTRUCTOR_CLASS, reconstructor);
        }
        conf
    }

    /// Job launcher for the configured prefix, user and reconstructor
    pub fn worker(&self) -> Worker {
        Worker::new(
            self.repair.prefix.as_str(),
            self.repair.job_user.as_str(),
            self.repair.reconstructor().map(String::from),
        )
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
