//! Request validation errors.

use thiserror::Error;

/// Reasons a request description cannot be built.
#[derive(Debug, Clone, PartialEq, Error)]
#[allow(missing_docs)]
pub enum RequestError {
    #[error("image uri may not be empty")]
    EmptyUri,

    #[error("image resource id may not be zero")]
    InvalidResourceId,

    #[error("at least one resize dimension has to be positive")]
    EmptyResize,

    #[error("center crop and center inside can not be used together")]
    ConflictingFit,

    #[error("{fit} requires a resize with positive width or height")]
    FitWithoutResize { fit: &'static str },

    #[error("only scale down requires a resize with positive width or height")]
    ScaleDownWithoutResize,

    #[error("transformation key must not be empty")]
    EmptyTransformationKey,

    #[error("rotation pivot requires non-zero rotation degrees")]
    PivotWithoutRotation,

    #[error("rotation degrees must be finite, got {degrees}")]
    InvalidRotation { degrees: f32 },
}

impl RequestError {
    /// Creates fit-without-resize error for center crop.
    #[must_use]
    pub const fn center_crop_without_resize() -> Self {
        Self::FitWithoutResize { fit: "center crop" }
    }

    /// Creates fit-without-resize error for center inside.
    #[must_use]
    pub const fn center_inside_without_resize() -> Self {
        Self::FitWithoutResize {
            fit: "center inside",
        }
    }
}
