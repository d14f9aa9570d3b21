//! Domain layer with core value types, errors and port definitions.

/// Connectivity snapshot.
pub mod connection;
/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use connection::Connectivity;
pub use entities::{Bitmap, CacheKey, LoadedFrom, Priority, Request, Tag, TargetId};
pub use errors::{LoadError, RequestError, TransformFault};
pub use ports::{Cache, RequestHandler, Target, Transformation};
