//! Errors raised while fetching, decoding or delivering an image.

use thiserror::Error;

/// Result type for load operations.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Load failure variants.
///
/// Cloneable so one failure can be handed to every consumer attached to
/// the same hunt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("io error: {message}")]
    Io { message: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("received response with content length {actual}, expected {expected}")]
    ContentLengthMismatch { expected: u64, actual: u64 },

    #[error("HTTP {status} (offline only: {offline_only})")]
    Response { status: u16, offline_only: bool },

    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("unrecognized type of request: {source_desc}")]
    Unrecognized { source_desc: String },

    #[error("offline only request has no local copy of {source_desc}")]
    OfflineOnly { source_desc: String },

    #[error("{handler} handler panicked: {message}")]
    HandlerPanicked {
        handler: &'static str,
        message: String,
    },

    #[error("dispatcher is shut down")]
    Shutdown,
}

impl LoadError {
    /// Creates io error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates unrecognized request error.
    #[must_use]
    pub fn unrecognized(source_desc: impl Into<String>) -> Self {
        Self::Unrecognized {
            source_desc: source_desc.into(),
        }
    }

    /// Creates offline-only miss error.
    #[must_use]
    pub fn offline_only(source_desc: impl Into<String>) -> Self {
        Self::OfflineOnly {
            source_desc: source_desc.into(),
        }
    }

    /// Creates handler panic error.
    #[must_use]
    pub fn handler_panicked(handler: &'static str, message: impl Into<String>) -> Self {
        Self::HandlerPanicked {
            handler,
            message: message.into(),
        }
    }

    /// Returns whether the hunt may be attempted again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Network { .. } | Self::ContentLengthMismatch { .. }
        )
    }

    /// Returns whether the response body disagreed with its declared length.
    #[must_use]
    pub const fn is_content_length_mismatch(&self) -> bool {
        matches!(self, Self::ContentLengthMismatch { .. })
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<image::ImageError> for LoadError {
    fn from(err: image::ImageError) -> Self {
        Self::decode(err.to_string())
    }
}
