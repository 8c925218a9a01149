//! The result record: one outcome of a claim.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::SchemaVersion;
use crate::storage::Document;

use super::record::Claim;
use super::store::KIND_RESULTS;

/// The operation has started and has not finished.
pub const STATUS_RUNNING: &str = "running";

/// The operation completed successfully.
pub const STATUS_SUCCEEDED: &str = "succeeded";

/// The operation completed unsuccessfully.
pub const STATUS_FAILED: &str = "failed";

/// The operation was canceled before it finished.
pub const STATUS_CANCELED: &str = "canceled";

/// The outcome of the operation cannot be determined.
pub const STATUS_UNKNOWN: &str = "unknown";

/// Metadata about the outputs a result generated, keyed by output name.
pub type OutputMetadata = BTreeMap<String, serde_json::Value>;

/// The outcome of a bundle operation, attached to its claim.
///
/// A claim may accumulate several results, and a result may be re-saved
/// under the same id to transition from `running` to a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    /// Version of the claim-data schema.
    pub schema_version: SchemaVersion,

    /// Id of the result. Lexicographic order equals creation order.
    pub id: String,

    /// Id of the claim the result belongs to.
    #[serde(rename = "claimID")]
    pub claim_id: String,

    /// Human-readable message elaborating on the status.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// The status of the operation.
    pub status: String,

    /// When the result was created.
    pub created: DateTime<Utc>,

    /// Metadata about the outputs the operation generated, for example
    /// flags recording how a value was produced.
    #[serde(
        rename = "outputs",
        default,
        skip_serializing_if = "OutputMetadata::is_empty"
    )]
    pub output_metadata: OutputMetadata,

    /// Custom extension data applicable to a given runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,

    /// The owning claim, carried in memory for status derivation and
    /// output sensitivity lookups; never persisted.
    #[serde(skip)]
    pub(crate) claim: Option<Box<Claim>>,
}

impl OperationResult {
    /// The owning claim, when the result was built through
    /// [`Claim::new_result`] or reconstructed by the store.
    #[must_use]
    pub fn claim(&self) -> Option<&Claim> {
        self.claim.as_deref()
    }
}

impl Document for OperationResult {
    fn kind(&self) -> &'static str {
        KIND_RESULTS
    }

    fn group(&self) -> String {
        self.claim_id.clone()
    }

    fn key(&self) -> String {
        self.id.clone()
    }

    fn data(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn should_encrypt(&self) -> bool {
        false
    }
}

/// Sorts results by id, which equals creation order.
pub fn sort_results(results: &mut [OperationResult]) {
    results.sort_by(|a, b| a.id.cmp(&b.id));
}
