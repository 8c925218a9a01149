//! The installation record: the root of a bundle's history.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;
use crate::labels;
use crate::reference;
use crate::schema::SchemaVersion;
use crate::storage::Document;

use super::error::ClaimError;
use super::record::{sort_claims, Claim, ACTION_INSTALL};
use super::result::{sort_results, OperationResult, STATUS_UNKNOWN};
use super::store::KIND_INSTALLATIONS;

/// Names must be usable as storage keys and path segments.
fn valid_name() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[a-zA-Z0-9_-]+$").expect("static pattern"))
}

/// The storage key of an installation: `"<namespace>/<name>"`, or just the
/// name when the namespace is empty (global).
#[must_use]
pub fn installation_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}

/// The installation of a bundle under a `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    /// Version of the installation state schema.
    pub schema_version: SchemaVersion,

    /// Name of the installation.
    pub name: String,

    /// Namespace in which the installation is defined; empty means global.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// OCI repository of the current bundle definition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bundle_repository: String,

    /// Current version of the bundle.
    pub bundle_version: String,

    /// Current digest of the bundle.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bundle_digest: String,

    /// When the installation record was created. Immutable.
    pub created: DateTime<Utc>,

    /// When the installation record was last modified.
    pub modified: DateTime<Utc>,

    /// Custom extension data applicable to a given runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,

    /// Labels applied to the installation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Summary status, derived from the claims and results.
    pub status: InstallationStatus,

    /// In-memory claim history for legacy queries; never persisted.
    #[serde(skip)]
    claims: Vec<Claim>,
}

/// The summary status embedded in an installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationStatus {
    /// Id of the claim that last informed the status.
    #[serde(rename = "claimID", default)]
    pub claim_id: String,

    /// Action of the claim that last informed the status.
    #[serde(default)]
    pub action: String,

    /// Revision of the installation.
    #[serde(default)]
    pub revision: String,

    /// Id of the result that last informed the status.
    #[serde(rename = "resultID", default)]
    pub result_id: String,

    /// Status of the result that last informed the status.
    #[serde(rename = "resultStatus", default)]
    pub result_status: String,
}

impl Installation {
    /// Creates a new installation record for a bundle.
    ///
    /// Labels are copied from the bundle; `created` and `modified` start
    /// equal. When a bundle reference is given, its repository (without
    /// tag or digest) becomes the installation's `bundle_repository`.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InvalidName`] when the name does not match
    /// `[a-zA-Z0-9_-]+` and [`ClaimError::InvalidReference`] when the
    /// bundle reference cannot be parsed.
    pub fn new(
        namespace: &str,
        name: &str,
        bundle: &Bundle,
        bundle_reference: &str,
        bundle_digest: &str,
    ) -> Result<Self, ClaimError> {
        if !valid_name().is_match(name) {
            return Err(ClaimError::InvalidName {
                name: name.to_string(),
            });
        }

        let bundle_repository = if bundle_reference.is_empty() {
            String::new()
        } else {
            reference::parse_normalized(bundle_reference)
                .map_err(|source| ClaimError::InvalidReference {
                    reference: bundle_reference.to_string(),
                    source,
                })?
                .repository()
        };

        let now = Utc::now();
        Ok(Self {
            schema_version: SchemaVersion::default(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            bundle_repository,
            bundle_version: bundle.version.clone(),
            bundle_digest: bundle_digest.to_string(),
            created: now,
            modified: now,
            custom: None,
            labels: bundle.labels.clone(),
            status: InstallationStatus::default(),
            claims: Vec::new(),
        })
    }

    /// The storage key of this installation.
    #[must_use]
    pub fn key(&self) -> String {
        installation_key(&self.namespace, &self.name)
    }

    /// Merges user-supplied labels into the installation.
    ///
    /// Entries in the reserved `cnab.io/` namespace are dropped with a
    /// warning; the runtime owns that prefix.
    pub fn merge_user_labels(&mut self, user_labels: BTreeMap<String, String>) {
        self.labels.extend(labels::filter_reserved(user_labels));
    }

    /// The name of the application represented by the bundle, if labeled.
    #[must_use]
    pub fn app(&self) -> &str {
        self.labels.get(labels::APP).map_or("", String::as_str)
    }

    /// The version of the application represented by the bundle, if
    /// labeled.
    #[must_use]
    pub fn app_version(&self) -> &str {
        self.labels
            .get(labels::APP_VERSION)
            .map_or("", String::as_str)
    }

    /// The last known status of the installation.
    ///
    /// Prefers the derived summary; `unknown` when no result has informed
    /// it yet.
    #[must_use]
    pub fn status(&self) -> &str {
        if self.status.result_status.is_empty() {
            STATUS_UNKNOWN
        } else {
            &self.status.result_status
        }
    }

    /// Updates the installation to match a bundle operation about to run.
    ///
    /// Bundle coordinates and labels follow the claim (the claim wins on
    /// label conflicts), the status points at the claim with its result
    /// fields cleared, and `modified` is refreshed.
    pub fn apply_claim(&mut self, claim: &Claim) {
        self.bundle_version = claim.bundle.version.clone();
        self.bundle_digest = claim.bundle_digest.clone();
        if let Ok(parsed) = reference::parse_normalized(&claim.bundle_reference) {
            self.bundle_repository = parsed.repository();
        }

        for (key, value) in &claim.bundle.labels {
            self.labels.insert(key.clone(), value.clone());
        }

        self.status = InstallationStatus {
            claim_id: claim.id.clone(),
            revision: claim.revision.clone(),
            action: claim.action.clone(),
            result_id: String::new(),
            result_status: String::new(),
        };
        self.modified = Utc::now();
    }

    /// Updates the installation status to match the latest result.
    pub fn apply_result(&mut self, result: &OperationResult) {
        self.status.result_id = result.id.clone();
        self.status.result_status = result.status.clone();
        self.modified = Utc::now();
    }

    /// Attaches a claim history for the legacy queries below, sorting the
    /// claims and any nested results.
    pub fn load_claims(&mut self, mut claims: Vec<Claim>) {
        sort_claims(&mut claims);
        for claim in &mut claims {
            if let Some(results) = claim.results.as_mut() {
                sort_results(results);
            }
        }
        self.claims = claims;
    }

    /// The timestamp of the first install claim.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::NoClaims`] when no claims are loaded and
    /// [`ClaimError::NeverInstalled`] when none of them is an install.
    pub fn installation_timestamp(&self) -> Result<DateTime<Utc>, ClaimError> {
        if self.claims.is_empty() {
            return Err(ClaimError::NoClaims {
                installation: self.name.clone(),
            });
        }
        self.claims
            .iter()
            .find(|claim| claim.action == ACTION_INSTALL)
            .map(|claim| claim.created)
            .ok_or_else(|| ClaimError::NeverInstalled {
                installation: self.name.clone(),
            })
    }

    /// The most recent loaded claim.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::NoClaims`] when no claims are loaded.
    pub fn last_claim(&self) -> Result<&Claim, ClaimError> {
        self.claims.last().ok_or_else(|| ClaimError::NoClaims {
            installation: self.name.clone(),
        })
    }

    /// The most recent result of the most recent loaded claim.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::NoClaims`], [`ClaimError::NoResultsLoaded`] or
    /// [`ClaimError::EmptyResults`] when the in-memory view cannot answer.
    pub fn last_result(&self) -> Result<&OperationResult, ClaimError> {
        let claim = self.last_claim()?;
        let results = claim.results.as_ref().ok_or(ClaimError::NoResultsLoaded)?;
        results.last().ok_or(ClaimError::EmptyResults)
    }

    /// The status of the most recent result, or `unknown` when it cannot
    /// be determined from the loaded history.
    #[must_use]
    pub fn last_status(&self) -> &str {
        self.last_result()
            .map_or(STATUS_UNKNOWN, |result| result.status.as_str())
    }
}

impl Document for Installation {
    fn kind(&self) -> &'static str {
        KIND_INSTALLATIONS
    }

    fn group(&self) -> String {
        self.namespace.clone()
    }

    fn key(&self) -> String {
        installation_key(&self.namespace, &self.name)
    }

    fn data(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn should_encrypt(&self) -> bool {
        false
    }
}

/// Sorts installations alphabetically by name.
pub fn sort_by_name(installations: &mut [Installation]) {
    installations.sort_by(|a, b| a.name.cmp(&b.name));
}

/// Sorts installations by modification time, oldest first.
pub fn sort_by_modified(installations: &mut [Installation]) {
    installations.sort_by(|a, b| a.modified.cmp(&b.modified));
}
