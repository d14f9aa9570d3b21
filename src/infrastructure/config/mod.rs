//! Application configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{AppConfig, LogLevel, PipelineConfig};
pub use args::{CliArgs, PriorityArg};
pub use storage::{ConfigError, ConfigStore};
