//! imgrelay - asynchronous image fetch, decode, transform and cache pipeline.
//!
//! Requests for the same image are coalesced into one hunt, run on a
//! bounded priority-ordered worker pool, and delivered to consumer targets
//! on a single callback context.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the consumer-facing pipeline.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the dispatch engine and its adapters.
pub mod infrastructure;

pub use application::{ImagePipeline, PipelineBuilder};

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = "imgrelay";
