mod cache_port;
mod request_handler_port;
mod target_port;
mod transformation_port;

pub use cache_port::Cache;
pub use request_handler_port::RequestHandler;
pub use target_port::Target;
pub use transformation_port::Transformation;

#[cfg(test)]
pub mod mocks {
    pub use super::request_handler_port::mock::StubHandler;
    pub use super::target_port::mock::{RecordingTarget, TargetEvent};
    pub use super::transformation_port::mock::{
        KeyedTransformation, PanickingTransformation, ReleasingTransformation,
        ShrinkTransformation,
    };
}
