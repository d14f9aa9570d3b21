//! Application layer: the consumer-facing pipeline.

/// Pipeline facade and builder.
pub mod pipeline;
#[cfg(test)]
mod pipeline_test;

pub use pipeline::{ImagePipeline, PipelineBuilder};
