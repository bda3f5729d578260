//! Error types for the cart sync engine.

use thiserror::Error;

/// All possible errors from the cart sync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("product id must not be empty")]
    EmptyProductId,

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    // Remote errors
    #[error("remote rejected batch: {0}")]
    Remote(String),

    #[error("remote unreachable: {0}")]
    Unreachable(String),
}

/// Coarse classification callers use to tell "my mutation failed" apart from
/// "my mutation is saved but not yet confirmed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input, rejected before any mutation.
    Validation,
    /// Local persistence failure. Existing state is left intact.
    Storage,
    /// Sync batch rejected or the remote could not be reached.
    Remote,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyProductId | Error::NonPositiveQuantity(_) => ErrorKind::Validation,
            Error::Storage(_) | Error::InvalidSnapshot(_) => ErrorKind::Storage,
            Error::Remote(_) | Error::Unreachable(_) => ErrorKind::Remote,
        }
    }

    /// Whether a transport layer may retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unreachable(_))
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
