//! Backing-store error type.

use thiserror::Error;

/// Errors returned by backing-store implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested record (or group) does not exist.
    ///
    /// This is the sentinel the claim store converts into its typed
    /// not-found errors; implementations must return it rather than a
    /// backend-specific equivalent.
    #[error("record does not exist")]
    RecordDoesNotExist,

    /// An I/O failure from a file-backed store.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure from the backing datastore.
    #[error("storage backend error: {message}")]
    Backend {
        /// Description from the backend.
        message: String,
    },
}

impl StorageError {
    /// Reports whether the error is the not-found sentinel.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordDoesNotExist)
    }
}
