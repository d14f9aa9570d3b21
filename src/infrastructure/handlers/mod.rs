//! Built-in fetch/decode collaborators.

pub mod decode;
pub mod file;
pub mod network;
pub mod unrecognized;

pub use decode::decode;
pub use file::FileRequestHandler;
pub use network::{DEFAULT_RETRY_COUNT, NetworkRequestHandler};
pub use unrecognized::UnrecognizedRequestHandler;
