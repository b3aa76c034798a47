//! Status taxonomy shared by every pipeline crate (thiserror-based).

use thiserror::Error;

/// Pipeline error.
///
/// The first six variants are the closed parameter/lifecycle taxonomy the
/// decode+VPP API exposes; the remaining ones cover runtime failures of the
/// surface pools and of the decoder / filter-engine collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VplError {
    /// Malformed or unsupported field value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Structurally valid, but not supported by this implementation
    /// (opaque memory, conflicting filter combination).
    #[error("incompatible parameter: {0}")]
    IncompatibleParameter(String),

    /// A required surface, handle or pointer was missing.
    #[error("null input: {0}")]
    NullInput(&'static str),

    /// Operation invoked before the required init step (or after close).
    #[error("not initialized: {0}")]
    NotInitialized(&'static str),

    /// Lookup by id failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Feature not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Init called on a component that is already live.
    #[error("already initialized: {0}")]
    AlreadyInitialized(&'static str),

    /// A surface pool has no idle surface left.
    #[error("not enough buffer: pool of {capacity} surfaces exhausted")]
    NotEnoughBuffer { capacity: usize },

    /// Decoder or filter engine reported an internal failure.
    #[error("device failed: {0}")]
    DeviceFailed(String),
}

impl VplError {
    /// Shorthand for [`VplError::InvalidParameter`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        VplError::InvalidParameter(reason.into())
    }

    /// Shorthand for [`VplError::IncompatibleParameter`].
    pub fn incompatible(reason: impl Into<String>) -> Self {
        VplError::IncompatibleParameter(reason.into())
    }

    /// True for the two parameter-validation categories.
    pub fn is_parameter_error(&self) -> bool {
        matches!(
            self,
            VplError::InvalidParameter(_) | VplError::IncompatibleParameter(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VplError>;
