//! The claim record: one intended bundle operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;
use crate::id::new_record_id;
use crate::schema::SchemaVersion;
use crate::storage::Document;

use super::error::ClaimError;
use super::result::{OperationResult, OutputMetadata};
use super::store::KIND_CLAIMS;

/// The action that creates an installation.
pub const ACTION_INSTALL: &str = "install";

/// The action that upgrades an installation.
pub const ACTION_UPGRADE: &str = "upgrade";

/// The action that removes an installation.
pub const ACTION_UNINSTALL: &str = "uninstall";

/// The sentinel for a claim whose action was never set.
pub const ACTION_UNKNOWN: &str = "unknown";

/// A record of one bundle operation against an installation.
///
/// Claims embed a copy of the bundle at operation time so that later reads
/// resolve output sensitivity against the definitions in force when the
/// operation ran. Claims always pass through the store's encryption
/// handler at rest; their parameters may carry secrets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    /// Version of the claim-data schema.
    pub schema_version: SchemaVersion,

    /// Id of the claim. Lexicographic order equals creation order.
    pub id: String,

    /// Name of the installation the claim belongs to.
    pub installation: String,

    /// Id of the revision of the installation this claim produced.
    ///
    /// Every modifying claim starts a new revision; observational claims
    /// inherit the revision they observed.
    pub revision: String,

    /// When the claim was created.
    pub created: DateTime<Utc>,

    /// The action being performed.
    pub action: String,

    /// The bundle definition at operation time.
    pub bundle: Bundle,

    /// Reference to where the bundle was resolved from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bundle_reference: String,

    /// Digest of the bundle at operation time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bundle_digest: String,

    /// Parameters passed to the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,

    /// Custom extension data applicable to a given runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,

    /// Results loaded for the legacy in-memory queries; never persisted.
    #[serde(skip)]
    pub(crate) results: Option<Vec<OperationResult>>,
}

impl Claim {
    /// Creates a claim for an operation against an installation.
    ///
    /// The claim receives a fresh id and starts a fresh revision.
    #[must_use]
    pub fn new(
        installation: &str,
        action: &str,
        bundle: Bundle,
        bundle_reference: &str,
        bundle_digest: &str,
        parameters: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        Self {
            schema_version: SchemaVersion::default(),
            id: new_record_id(),
            installation: installation.to_string(),
            revision: new_record_id(),
            created: Utc::now(),
            action: action.to_string(),
            bundle,
            bundle_reference: bundle_reference.to_string(),
            bundle_digest: bundle_digest.to_string(),
            parameters,
            custom: None,
            results: None,
        }
    }

    /// Creates the next claim against the same installation.
    ///
    /// Modifying actions start a new revision; observational actions
    /// inherit this claim's revision.
    #[must_use]
    pub fn next_claim(
        &self,
        action: &str,
        bundle: Bundle,
        bundle_reference: &str,
        bundle_digest: &str,
        parameters: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        let mut claim = Self::new(
            &self.installation,
            action,
            bundle,
            bundle_reference,
            bundle_digest,
            parameters,
        );
        if !claim.is_modifying_action().unwrap_or(false) {
            claim.revision.clone_from(&self.revision);
        }
        claim
    }

    /// Creates a result for this claim with a fresh id.
    ///
    /// The result carries a by-value reference back to this claim so the
    /// store can derive installation status without re-reading it.
    #[must_use]
    pub fn new_result(&self, status: &str) -> OperationResult {
        OperationResult {
            schema_version: SchemaVersion::default(),
            id: new_record_id(),
            claim_id: self.id.clone(),
            message: String::new(),
            status: status.to_string(),
            created: Utc::now(),
            output_metadata: OutputMetadata::new(),
            custom: None,
            claim: Some(Box::new(self.clone())),
        }
    }

    /// Reports whether a successful run of this claim's action may alter
    /// the installation's summary status.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::UnsetAction`] when the action was never set
    /// and [`ClaimError::UndefinedAction`] when a custom action is not
    /// declared by the bundle. The write path treats either as
    /// non-modifying.
    pub fn is_modifying_action(&self) -> Result<bool, ClaimError> {
        match self.action.as_str() {
            ACTION_INSTALL | ACTION_UPGRADE | ACTION_UNINSTALL => Ok(true),
            ACTION_UNKNOWN => Err(ClaimError::UnsetAction),
            custom => self
                .bundle
                .action(custom)
                .map(|action| action.modifies)
                .ok_or_else(|| ClaimError::UndefinedAction {
                    action: custom.to_string(),
                }),
        }
    }
}

impl Document for Claim {
    fn kind(&self) -> &'static str {
        KIND_CLAIMS
    }

    fn group(&self) -> String {
        self.installation.clone()
    }

    fn key(&self) -> String {
        self.id.clone()
    }

    fn data(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn should_encrypt(&self) -> bool {
        true
    }
}

/// Sorts claims by id, which equals creation order.
pub fn sort_claims(claims: &mut [Claim]) {
    claims.sort_by(|a, b| a.id.cmp(&b.id));
}
