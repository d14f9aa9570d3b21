//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::args::CliArgs;
use crate::infrastructure::cache::DEFAULT_MAX_SIZE;
use crate::infrastructure::dispatch::DEFAULT_THREAD_COUNT;
use crate::infrastructure::handlers::DEFAULT_RETRY_COUNT;

pub(crate) const APP_NAME: &str = "imgrelay";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "linuxmobile";

const BYTES_PER_MIB: usize = 1024 * 1024;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Dispatch engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of hunts running at once.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Memory cache budget in bytes.
    #[serde(default = "default_memory_cache_bytes")]
    pub memory_cache_bytes: usize,

    /// Whether connectivity changes are pushed in. Enables replay of
    /// failed network loads on reconnect.
    #[serde(default)]
    pub monitor_connectivity: bool,

    /// Per-request network timeout in seconds.
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,

    /// Retries granted to network loads.
    #[serde(default = "default_network_retry_count")]
    pub network_retry_count: u32,
}

const fn default_worker_threads() -> usize {
    DEFAULT_THREAD_COUNT
}

const fn default_memory_cache_bytes() -> usize {
    DEFAULT_MAX_SIZE
}

const fn default_network_timeout_secs() -> u64 {
    20
}

const fn default_network_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

impl PipelineConfig {
    /// Network timeout as a duration.
    #[must_use]
    pub const fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            memory_cache_bytes: default_memory_cache_bytes(),
            monitor_connectivity: false,
            network_timeout_secs: default_network_timeout_secs(),
            network_retry_count: default_network_retry_count(),
        }
    }
}

/// Application configuration: config file merged with CLI flags.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Dispatch engine settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(threads) = args.threads {
            self.pipeline.worker_threads = threads.max(1);
        }
        if let Some(cache_mb) = args.cache_mb {
            self.pipeline.memory_cache_bytes = cache_mb.saturating_mul(BYTES_PER_MIB);
        }
        if let Some(retries) = args.retries {
            self.pipeline.network_retry_count = retries;
        }
        if let Some(timeout) = args.timeout_secs {
            self.pipeline.network_timeout_secs = timeout;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("imgrelay.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}
