//! Well-known installation labels.
//!
//! Labels prefixed with `cnab.io/` are reserved for the runtime; user
//! supplied labels carrying that prefix are dropped before they reach a
//! persisted record.

use std::collections::BTreeMap;

/// Label holding the name of the application represented by a bundle.
pub const APP: &str = "cnab.io/app";

/// Label holding the version of the application represented by a bundle.
pub const APP_VERSION: &str = "cnab.io/appVersion";

/// Prefix reserved for runtime-owned labels.
pub const RESERVED_PREFIX: &str = "cnab.io/";

/// Reports whether a label key belongs to the reserved namespace.
#[must_use]
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Removes reserved-prefix entries from a user-supplied label set.
///
/// Dropped keys are logged; the remainder is returned unchanged.
#[must_use]
pub fn filter_reserved(labels: BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels
        .into_iter()
        .filter(|(key, _)| {
            if is_reserved(key) {
                tracing::warn!(label = %key, "dropping user label in reserved namespace");
                false
            } else {
                true
            }
        })
        .collect()
}
