//! Version stamp applied to persisted claim data.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The schema version written to new installations, claims and results.
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.1";

/// The version of the claim-data schema a record was written with.
///
/// Stored verbatim on every structured record so that future readers can
/// detect documents produced by older releases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(String);

impl SchemaVersion {
    /// Wraps an explicit version string.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// The version as a string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self(DEFAULT_SCHEMA_VERSION.to_string())
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
