//! Persistence primitives for claim data.
//!
//! The claim store speaks to any datastore implementing the [`Store`]
//! contract: an untyped key/group/item space with a connection lifecycle.
//! [`BackingStore`] wraps a concrete store with scoped connection
//! management so that every public claim-store operation produces exactly
//! one connect/close pair, no matter how many primitive calls it issues.
//!
//! Entities project themselves into storage through the [`Document`] trait,
//! and [`save_document`] applies the configured [`EncryptionHandler`] to
//! documents that ask for it.

mod backing;
mod error;
mod filesystem;
mod memory;

pub use backing::{BackingStore, ConnectionScope, Store};
pub use error::StorageError;
pub use filesystem::{claim_store_extensions, FileSystemStore};
pub use memory::MemoryStore;

use std::sync::Arc;

/// The group used for installations that are not namespaced.
pub const NAMESPACE_GLOBAL: &str = "";

/// Boxed error produced by encryption handlers.
pub type CryptoError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A function that transforms record bytes by encrypting or decrypting
/// them.
pub type EncryptionHandler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, CryptoError> + Send + Sync>;

/// An encryption handler that leaves the data unchanged.
#[must_use]
pub fn noop_encryption_handler() -> EncryptionHandler {
    Arc::new(|data| Ok(data.to_vec()))
}

/// Errors raised while projecting a document into storage.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DocumentError {
    /// The document could not be serialized.
    #[error("error serializing {kind} document: {source}")]
    Serialize {
        /// The document kind.
        kind: &'static str,
        /// The underlying serializer error.
        source: serde_json::Error,
    },

    /// The encryption handler rejected the document payload.
    #[error("error encrypting {kind} document {key}: {source}")]
    Encrypt {
        /// The document kind.
        kind: &'static str,
        /// The document key.
        key: String,
        /// The underlying handler error.
        source: CryptoError,
    },

    /// The backing store failed to persist the document.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A uniform storage view of a persistable entity.
pub trait Document {
    /// The location in the backing store where this kind of document lives.
    fn kind(&self) -> &'static str;

    /// The group the document is listed under.
    fn group(&self) -> String;

    /// The document key, unique within its kind.
    fn key(&self) -> String;

    /// The storage representation of the document.
    ///
    /// # Errors
    ///
    /// Returns the serializer error when the document cannot be encoded.
    fn data(&self) -> Result<Vec<u8>, serde_json::Error>;

    /// Whether the document must pass through the encryption handler
    /// before it reaches the backing store.
    fn should_encrypt(&self) -> bool;
}

/// Serializes a document, encrypts it when required, and saves it.
///
/// # Errors
///
/// Returns a [`DocumentError`] when serialization, encryption or the
/// backing store fails.
pub fn save_document<D: Document + ?Sized>(
    store: &BackingStore,
    document: &D,
    encrypt: &EncryptionHandler,
) -> Result<(), DocumentError> {
    let mut data = document.data().map_err(|source| DocumentError::Serialize {
        kind: document.kind(),
        source,
    })?;

    if document.should_encrypt() {
        data = encrypt(&data).map_err(|source| DocumentError::Encrypt {
            kind: document.kind(),
            key: document.key(),
            source,
        })?;
    }

    store.save(document.kind(), &document.group(), &document.key(), &data)?;
    Ok(())
}
