//! Pipeline error taxonomy

use thiserror::Error;

/// Errors the pipeline distinguishes when deciding how to react
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A model or engine could not be constructed. Fatal at startup.
    #[error("{capability} unavailable: {reason}")]
    Unavailable {
        capability: &'static str,
        reason: String,
    },

    /// The frame buffer or requested region cannot be processed.
    /// The frame is skipped.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

impl PipelineError {
    pub fn unavailable(capability: &'static str, reason: impl ToString) -> Self {
        Self::Unavailable {
            capability,
            reason: reason.to_string(),
        }
    }

    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame(reason.into())
    }
}

/// Whether an error only invalidates the current frame
pub fn is_frame_error(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::InvalidFrame(_)))
}
