use crate::codec::{Codec, default_codecs};
use crate::conf::DEFAULT_MAX_FIX_TIME_FOR_FILE;
use crate::humanize::Millis;
use crate::reconstructor::PresenceCheckReconstructor;
use crate::repair::{CORRUPTION_PREFIX, JOB_USER};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default = "default_codecs")]
    pub codecs: Vec<Codec>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            repair: RepairConfig::default(),
            engine: EngineConfig::default(),
            codecs: default_codecs(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Root directory of the local provider
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/dfs")
}

/// Repair manager settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepairConfig {
    /// Wall-time budget per repair
    #[serde(default = "default_max_fix_time")]
    pub max_fix_time: Millis,
    /// Scratch prefix for manifests and job output
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_job_user")]
    pub job_user: String,
    /// Registered reconstructor name. Empty leaves the job configuration
    /// without one and tasks then process no records.
    #[serde(default = "default_reconstructor")]
    pub reconstructor: String,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_fix_time: default_max_fix_time(),
            prefix: default_prefix(),
            job_user: default_job_user(),
            reconstructor: default_reconstructor(),
        }
    }
}

fn default_max_fix_time() -> Millis {
    Millis(DEFAULT_MAX_FIX_TIME_FOR_FILE)
}

fn default_prefix() -> String {
    CORRUPTION_PREFIX.to_string()
}

fn default_job_user() -> String {
    JOB_USER.to_string()
}

fn default_reconstructor() -> String {
    PresenceCheckReconstructor::NAME.to_string()
}

impl RepairConfig {
    pub fn reconstructor(&self) -> Option<&str> {
        Some(self.reconstructor.trim()).filter(|name| !name.is_empty())
    }
}

/// In-process compute engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel_tasks(),
        }
    }
}

fn default_max_parallel_tasks() -> usize {
    4
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
