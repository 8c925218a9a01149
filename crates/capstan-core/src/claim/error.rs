//! Domain errors for claim data.

use thiserror::Error;

use crate::reference::ReferenceError;
use crate::storage::{CryptoError, DocumentError, StorageError};

/// Errors raised by the claim store and the claim entities.
///
/// The four not-found variants carry stable messages; callers match on
/// them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClaimError {
    /// The installation is not present in claim storage.
    #[error("Installation does not exist")]
    InstallationNotFound,

    /// The claim is not present in claim storage.
    #[error("Claim does not exist")]
    ClaimNotFound,

    /// The result is not present in claim storage.
    #[error("Result does not exist")]
    ResultNotFound,

    /// The output is not present in claim storage.
    #[error("Output does not exist")]
    OutputNotFound,

    /// The claim exists but has no results yet.
    #[error("claim {claim_id} has no results")]
    NoResults {
        /// The claim that has no results.
        claim_id: String,
    },

    /// An in-memory installation view has no claims loaded.
    #[error("the installation {installation} has no claims")]
    NoClaims {
        /// The installation name.
        installation: String,
    },

    /// The installation's claims never include an install action.
    #[error("the installation {installation} has never been installed")]
    NeverInstalled {
        /// The installation name.
        installation: String,
    },

    /// The most recent claim was loaded without its results.
    #[error("the last claim does not have any results loaded")]
    NoResultsLoaded,

    /// The most recent claim's loaded result list is empty.
    #[error("the last claim has no results")]
    EmptyResults,

    /// The installation name fails validation.
    #[error("invalid installation name '{name}'. Names must be [a-zA-Z0-9-_]+")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The bundle reference cannot be parsed.
    #[error("invalid bundle reference '{reference}': {source}")]
    InvalidReference {
        /// The rejected reference string.
        reference: String,
        /// The parser error.
        source: ReferenceError,
    },

    /// The claim's action was never set.
    #[error("action is not set")]
    UnsetAction,

    /// The claim names a custom action the bundle does not declare.
    #[error("custom action not defined in the bundle: {action}")]
    UndefinedAction {
        /// The unknown action name.
        action: String,
    },

    /// An output was saved without its originating claim.
    #[error("output claim is not set")]
    MissingClaim,

    /// A record could not be encoded for storage.
    #[error("error serializing {entity}: {source}")]
    Serialization {
        /// The record kind.
        entity: &'static str,
        /// The underlying serializer error.
        source: serde_json::Error,
    },

    /// A stored record could not be decoded.
    #[error("error deserializing {entity}: {source}")]
    Deserialization {
        /// The record kind.
        entity: &'static str,
        /// The underlying serializer error.
        source: serde_json::Error,
    },

    /// The encryption handler failed.
    #[error("error encrypting {entity}: {source}")]
    Encryption {
        /// A description of the record being encrypted.
        entity: String,
        /// The handler error.
        source: CryptoError,
    },

    /// The decryption handler failed.
    #[error("error decrypting {entity}: {source}")]
    Decryption {
        /// A description of the record being decrypted.
        entity: String,
        /// The handler error.
        source: CryptoError,
    },

    /// Any other backing-store failure, surfaced unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<DocumentError> for ClaimError {
    fn from(error: DocumentError) -> Self {
        match error {
            DocumentError::Serialize { kind, source } => Self::Serialization {
                entity: kind,
                source,
            },
            DocumentError::Encrypt { kind, key, source } => Self::Encryption {
                entity: format!("{kind} {key}"),
                source,
            },
            DocumentError::Storage(source) => Self::Storage(source),
        }
    }
}

impl ClaimError {
    /// Converts the backing store's not-found sentinel into a typed domain
    /// error, passing every other error through unchanged.
    pub(crate) fn normalize_not_found(error: StorageError, not_found: Self) -> Self {
        if error.is_not_found() {
            not_found
        } else {
            Self::Storage(error)
        }
    }
}
