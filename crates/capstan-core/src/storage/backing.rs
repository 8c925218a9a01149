//! The backing-store contract and scoped connection management.

// Mutex poisoning indicates a panic in another thread, which is
// unrecoverable.
#![allow(clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};

use super::StorageError;

/// The contract any backing datastore must implement.
///
/// A store is an untyped key/group/item space. Kinds partition the space by
/// record type; groups bucket sibling records for listing (an
/// installation's claims, a claim's results, a result's outputs). Keys are
/// unique within a kind.
///
/// Implementations must return [`StorageError::RecordDoesNotExist`] when a
/// read, delete or list targets a record or group that is absent, so the
/// claim store can normalize it into a typed domain error.
pub trait Store: Send + Sync {
    /// Opens the connection to the datastore.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the datastore is unreachable.
    fn connect(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Closes the connection to the datastore.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when teardown fails.
    fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Lists the member names within a group, in unspecified order.
    ///
    /// Member names are keys with their leading `"<group>/"` prefix
    /// stripped when present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::RecordDoesNotExist`] when the group has
    /// never been written.
    fn list(&self, kind: &str, group: &str) -> Result<Vec<String>, StorageError>;

    /// Reads a single record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::RecordDoesNotExist`] when the key is absent.
    fn read(&self, kind: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Reads every record within a group.
    ///
    /// An empty group reads every record of the kind.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::RecordDoesNotExist`] when a named group has
    /// never been written.
    fn read_all(&self, kind: &str, group: &str) -> Result<Vec<Vec<u8>>, StorageError>;

    /// Upserts a record.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the write fails.
    fn save(&self, kind: &str, group: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Removes a single record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::RecordDoesNotExist`] when the key is absent.
    fn delete(&self, kind: &str, key: &str) -> Result<(), StorageError>;
}

/// A backing store with scoped connection management.
///
/// Callers that issue several primitive calls as one logical operation open
/// a [`ConnectionScope`] around them; the underlying [`Store::connect`]
/// runs only when the first scope opens and [`Store::close`] only when the
/// last one drops. Primitive calls made without an enclosing scope open one
/// for their own duration, so a bare read still produces a single
/// connect/close pair.
pub struct BackingStore {
    store: Arc<dyn Store>,
    holders: Arc<Mutex<usize>>,
}

impl Clone for BackingStore {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            holders: Arc::clone(&self.holders),
        }
    }
}

impl BackingStore {
    /// Wraps a concrete datastore.
    pub fn new(store: impl Store + 'static) -> Self {
        Self {
            store: Arc::new(store),
            holders: Arc::new(Mutex::new(0)),
        }
    }

    /// Opens a connection scope.
    ///
    /// The scope releases on drop, closing the datastore connection when no
    /// other scope remains open. When the connect itself fails no scope is
    /// returned, so there is nothing for the caller to release.
    ///
    /// # Errors
    ///
    /// Propagates the [`Store::connect`] failure.
    pub fn handle_connect(&self) -> Result<ConnectionScope<'_>, StorageError> {
        let mut holders = self.holders.lock().expect("lock poisoned");
        if *holders == 0 {
            self.store.connect()?;
        }
        *holders += 1;
        Ok(ConnectionScope { backing: self })
    }

    /// Lists the member names within a group.
    ///
    /// # Errors
    ///
    /// See [`Store::list`].
    pub fn list(&self, kind: &str, group: &str) -> Result<Vec<String>, StorageError> {
        let _scope = self.handle_connect()?;
        self.store.list(kind, group)
    }

    /// Reads a single record.
    ///
    /// # Errors
    ///
    /// See [`Store::read`].
    pub fn read(&self, kind: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let _scope = self.handle_connect()?;
        self.store.read(kind, key)
    }

    /// Reads every record within a group.
    ///
    /// # Errors
    ///
    /// See [`Store::read_all`].
    pub fn read_all(&self, kind: &str, group: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let _scope = self.handle_connect()?;
        self.store.read_all(kind, group)
    }

    /// Upserts a record.
    ///
    /// # Errors
    ///
    /// See [`Store::save`].
    pub fn save(&self, kind: &str, group: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let _scope = self.handle_connect()?;
        self.store.save(kind, group, key, data)
    }

    /// Removes a single record.
    ///
    /// # Errors
    ///
    /// See [`Store::delete`].
    pub fn delete(&self, kind: &str, key: &str) -> Result<(), StorageError> {
        let _scope = self.handle_connect()?;
        self.store.delete(kind, key)
    }
}

/// An open connection scope; dropping it releases the connection.
pub struct ConnectionScope<'a> {
    backing: &'a BackingStore,
}

impl Drop for ConnectionScope<'_> {
    fn drop(&mut self) {
        let mut holders = self.backing.holders.lock().expect("lock poisoned");
        *holders -= 1;
        if *holders == 0 {
            if let Err(error) = self.backing.store.close() {
                tracing::warn!(%error, "error closing backing store connection");
            }
        }
    }
}
