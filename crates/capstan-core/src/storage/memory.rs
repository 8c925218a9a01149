//! In-memory backing store.

// Lock poisoning indicates a panic in another thread, which is
// unrecoverable.
#![allow(clippy::missing_panics_doc)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::{StorageError, Store};

#[derive(Default)]
struct MemoryInner {
    /// Record bytes keyed by `(kind, key)`.
    items: HashMap<(String, String), Vec<u8>>,
    /// Group membership: `(kind, group)` to the full keys saved under it.
    groups: HashMap<(String, String), BTreeSet<String>>,
}

/// A backing store held entirely in memory.
///
/// Suitable for tests and for embedding the claim store without durable
/// state. Clones share the same storage, and the store counts connect and
/// close calls so tests can assert that a public operation opened exactly
/// one connection.
#[derive(Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            connects: Arc::clone(&self.connects),
            closes: Arc::clone(&self.closes),
        }
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of connect calls observed since the last reset.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// The number of close calls observed since the last reset.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Resets the connect and close counters.
    pub fn reset_counts(&self) {
        self.connects.store(0, Ordering::SeqCst);
        self.closes.store(0, Ordering::SeqCst);
    }

    /// Member name of a key within a group.
    fn member_name(group: &str, key: &str) -> String {
        if group.is_empty() {
            return key.to_string();
        }
        key.strip_prefix(&format!("{group}/"))
            .unwrap_or(key)
            .to_string()
    }
}

impl Store for MemoryStore {
    fn connect(&self) -> Result<(), StorageError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), StorageError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn list(&self, kind: &str, group: &str) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.read().expect("lock poisoned");
        let members = inner
            .groups
            .get(&(kind.to_string(), group.to_string()))
            .ok_or(StorageError::RecordDoesNotExist)?;
        Ok(members
            .iter()
            .map(|key| Self::member_name(group, key))
            .collect())
    }

    fn read(&self, kind: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .items
            .get(&(kind.to_string(), key.to_string()))
            .cloned()
            .ok_or(StorageError::RecordDoesNotExist)
    }

    fn read_all(&self, kind: &str, group: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let inner = self.inner.read().expect("lock poisoned");

        if group.is_empty() {
            // Whole-kind scan, ordered by key for deterministic output.
            let records: BTreeMap<&String, &Vec<u8>> = inner
                .items
                .iter()
                .filter(|((k, _), _)| k == kind)
                .map(|((_, key), data)| (key, data))
                .collect();
            return Ok(records.into_values().cloned().collect());
        }

        let members = inner
            .groups
            .get(&(kind.to_string(), group.to_string()))
            .ok_or(StorageError::RecordDoesNotExist)?;
        members
            .iter()
            .map(|key| {
                inner
                    .items
                    .get(&(kind.to_string(), key.clone()))
                    .cloned()
                    .ok_or(StorageError::RecordDoesNotExist)
            })
            .collect()
    }

    fn save(&self, kind: &str, group: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner
            .items
            .insert((kind.to_string(), key.to_string()), data.to_vec());
        inner
            .groups
            .entry((kind.to_string(), group.to_string()))
            .or_default()
            .insert(key.to_string());
        Ok(())
    }

    fn delete(&self, kind: &str, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner
            .items
            .remove(&(kind.to_string(), key.to_string()))
            .ok_or(StorageError::RecordDoesNotExist)?;
        for ((k, _), members) in &mut inner.groups {
            if k == kind {
                members.remove(key);
            }
        }
        Ok(())
    }
}
