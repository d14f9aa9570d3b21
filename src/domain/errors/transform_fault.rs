//! Fatal transformation contract violations.

use thiserror::Error;

/// A transformation broke its contract.
///
/// Faults are programming defects, never retried and never delivered as an
/// ordinary load failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum TransformFault {
    #[error("transformation {key} panicked: {message}")]
    Panicked { key: String, message: String },

    #[error("transformation {key} returned a released image")]
    ReleasedResult { key: String },
}

impl TransformFault {
    /// Key of the offending transformation.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Panicked { key, .. } | Self::ReleasedResult { key } => key,
        }
    }
}
