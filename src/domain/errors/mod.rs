//! Domain error types.

mod load_error;
mod request_error;
mod transform_fault;

pub use load_error::{LoadError, LoadResult};
pub use request_error::RequestError;
pub use transform_fault::TransformFault;
