//! Infrastructure layer with the dispatch engine and its adapters.

/// In-memory decoded image cache.
pub mod cache;
/// Application configuration.
pub mod config;
/// Dispatcher, hunters, worker pool and callback context.
pub mod dispatch;
/// Built-in request handlers.
pub mod handlers;
/// Built-in transformations.
pub mod transform;

pub use cache::{CacheStats, MemoryCache};
pub use config::{AppConfig, CliArgs, ConfigStore, LogLevel, PipelineConfig};
pub use dispatch::{ActionHandle, LoadOptions, Stats, StatsSnapshot};
pub use handlers::{FileRequestHandler, NetworkRequestHandler, UnrecognizedRequestHandler};
pub use transform::GeometryTransformation;
