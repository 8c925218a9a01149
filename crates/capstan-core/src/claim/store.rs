//! The persistent claim store.

// Mutex poisoning indicates a panic in another thread, which is
// unrecoverable.
#![allow(clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;

use crate::schema::SchemaVersion;
use crate::storage::{
    noop_encryption_handler, save_document, BackingStore, EncryptionHandler, NAMESPACE_GLOBAL,
};

use super::error::ClaimError;
use super::installation::{installation_key, sort_by_name, Installation};
use super::output::{Output, Outputs};
use super::record::{sort_claims, Claim};
use super::result::{sort_results, OperationResult, OutputMetadata, STATUS_UNKNOWN};

/// Kind under which installations are persisted.
pub const KIND_INSTALLATIONS: &str = "installations";

/// Kind under which claims are persisted.
pub const KIND_CLAIMS: &str = "claims";

/// Kind under which results are persisted.
pub const KIND_RESULTS: &str = "results";

/// Kind under which outputs are persisted.
pub const KIND_OUTPUTS: &str = "outputs";

/// The storage key of an output.
///
/// The result id makes the key unique; output names repeat across bundle
/// executions.
#[must_use]
pub(crate) fn output_key(result_id: &str, name: &str) -> String {
    format!("{result_id}-{name}")
}

/// A persistent store for claim data.
///
/// Writes of modifying claims and their results cascade into the owning
/// installation's summary status; that read-modify-write runs under a
/// process-wide lock so concurrent writers cannot tear the status. Every
/// public operation opens exactly one backing-store connection for its
/// duration.
#[derive(Clone)]
pub struct ClaimStore {
    backing: BackingStore,
    encrypt: EncryptionHandler,
    decrypt: EncryptionHandler,
    status_lock: Arc<Mutex<()>>,
}

impl ClaimStore {
    /// Creates a claim store over the given backing datastore, without
    /// encryption at rest.
    #[must_use]
    pub fn new(backing: BackingStore) -> Self {
        Self::with_encryption(
            backing,
            noop_encryption_handler(),
            noop_encryption_handler(),
        )
    }

    /// Creates a claim store that passes sensitive payloads through the
    /// given encryption handlers.
    ///
    /// Claims are always encrypted; outputs only when the bundle marks
    /// them sensitive.
    #[must_use]
    pub fn with_encryption(
        backing: BackingStore,
        encrypt: EncryptionHandler,
        decrypt: EncryptionHandler,
    ) -> Self {
        Self {
            backing,
            encrypt,
            decrypt,
            status_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The backing store behind this claim store.
    #[must_use]
    pub fn backing(&self) -> &BackingStore {
        &self.backing
    }

    fn decode<T: DeserializeOwned>(entity: &'static str, data: &[u8]) -> Result<T, ClaimError> {
        serde_json::from_slice(data).map_err(|source| ClaimError::Deserialization {
            entity,
            source,
        })
    }

    fn decrypt_record(&self, entity: String, data: &[u8]) -> Result<Vec<u8>, ClaimError> {
        (self.decrypt)(data).map_err(|source| ClaimError::Decryption { entity, source })
    }

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------

    /// Lists installation names within a namespace, alphabetically.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures. A namespace with no
    /// installations lists as empty.
    pub fn list_installations(&self, namespace: &str) -> Result<Vec<String>, ClaimError> {
        let group = if namespace.is_empty() {
            NAMESPACE_GLOBAL
        } else {
            namespace
        };
        let mut names = match self.backing.list(KIND_INSTALLATIONS, group) {
            Ok(names) => names,
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => return Err(error.into()),
        };
        names.sort();
        Ok(names)
    }

    /// Lists the claim ids of an installation, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InstallationNotFound`] when the installation
    /// has no claims.
    pub fn list_claims(&self, installation: &str) -> Result<Vec<String>, ClaimError> {
        let mut ids = self
            .backing
            .list(KIND_CLAIMS, installation)
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::InstallationNotFound))?;
        if ids.is_empty() {
            return Err(ClaimError::InstallationNotFound);
        }
        ids.sort();
        Ok(ids)
    }

    /// Lists the result ids of a claim, ascending.
    ///
    /// A claim with no results yet lists as empty; that is not an error.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    pub fn list_results(&self, claim_id: &str) -> Result<Vec<String>, ClaimError> {
        let mut ids = match self.backing.list(KIND_RESULTS, claim_id) {
            Ok(ids) => ids,
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => return Err(error.into()),
        };
        ids.sort();
        Ok(ids)
    }

    /// Lists the output names of a result, ascending, with the result-id
    /// prefix stripped.
    ///
    /// A result with no outputs lists as empty; that is not an error.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    pub fn list_outputs(&self, result_id: &str) -> Result<Vec<String>, ClaimError> {
        let keys = match self.backing.list(KIND_OUTPUTS, result_id) {
            Ok(keys) => keys,
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => return Err(error.into()),
        };

        let prefix = format!("{result_id}-");
        let mut names: Vec<String> = keys
            .into_iter()
            .map(|key| key.strip_prefix(&prefix).unwrap_or(&key).to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    // ------------------------------------------------------------------
    // Point reads
    // ------------------------------------------------------------------

    /// Reads an installation record.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InstallationNotFound`] when the record is
    /// absent.
    pub fn read_installation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Installation, ClaimError> {
        let data = self
            .backing
            .read(KIND_INSTALLATIONS, &installation_key(namespace, name))
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::InstallationNotFound))?;
        Self::decode("installation", &data)
    }

    /// Reads a claim record, decrypting it.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::ClaimNotFound`] when the record is absent.
    pub fn read_claim(&self, claim_id: &str) -> Result<Claim, ClaimError> {
        let data = self
            .backing
            .read(KIND_CLAIMS, claim_id)
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::ClaimNotFound))?;
        let data = self.decrypt_record(format!("claim {claim_id}"), &data)?;
        Self::decode("claim", &data)
    }

    /// Reads a result record.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::ResultNotFound`] when the record is absent.
    pub fn read_result(&self, result_id: &str) -> Result<OperationResult, ClaimError> {
        let data = self
            .backing
            .read(KIND_RESULTS, result_id)
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::ResultNotFound))?;
        Self::decode("result", &data)
    }

    /// Reads an output value, decrypting it when the claim's bundle marks
    /// the output sensitive.
    ///
    /// An output whose definition was since removed from the bundle is
    /// treated as not sensitive; it was stored unencrypted.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::OutputNotFound`] when the record is absent.
    pub fn read_output(
        &self,
        claim: &Claim,
        result: &OperationResult,
        name: &str,
    ) -> Result<Output, ClaimError> {
        let mut data = self
            .backing
            .read(KIND_OUTPUTS, &output_key(&result.id, name))
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::OutputNotFound))?;

        if claim.bundle.is_output_sensitive(name).unwrap_or(false) {
            data = self.decrypt_record(format!("output {name}"), &data)?;
        }

        Ok(Output::new(claim.clone(), result.clone(), name, data))
    }

    // ------------------------------------------------------------------
    // Bulk reads
    // ------------------------------------------------------------------

    /// Reads every installation record, sorted by name.
    ///
    /// # Errors
    ///
    /// Propagates backing-store and decode failures.
    pub fn read_all_installations(&self) -> Result<Vec<Installation>, ClaimError> {
        let items = match self.backing.read_all(KIND_INSTALLATIONS, NAMESPACE_GLOBAL) {
            Ok(items) => items,
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => return Err(error.into()),
        };

        let mut installations = Vec::with_capacity(items.len());
        for data in items {
            installations.push(Self::decode::<Installation>("installation", &data)?);
        }
        sort_by_name(&mut installations);
        Ok(installations)
    }

    /// Reads every claim of an installation, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InstallationNotFound`] when the installation
    /// has no claims.
    pub fn read_all_claims(&self, installation: &str) -> Result<Vec<Claim>, ClaimError> {
        let items = self
            .backing
            .read_all(KIND_CLAIMS, installation)
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::InstallationNotFound))?;
        if items.is_empty() {
            return Err(ClaimError::InstallationNotFound);
        }

        let mut claims = Vec::with_capacity(items.len());
        for data in items {
            let data = self.decrypt_record("claim".to_string(), &data)?;
            claims.push(Self::decode::<Claim>("claim", &data)?);
        }
        sort_claims(&mut claims);
        Ok(claims)
    }

    /// Reads every result of a claim, ascending by id.
    ///
    /// A claim with no results reads as empty; that is not an error.
    ///
    /// # Errors
    ///
    /// Propagates backing-store and decode failures.
    pub fn read_all_results(&self, claim_id: &str) -> Result<Vec<OperationResult>, ClaimError> {
        let items = match self.backing.read_all(KIND_RESULTS, claim_id) {
            Ok(items) => items,
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => return Err(error.into()),
        };

        let mut results = Vec::with_capacity(items.len());
        for data in items {
            results.push(Self::decode::<OperationResult>("result", &data)?);
        }
        sort_results(&mut results);
        Ok(results)
    }

    // ------------------------------------------------------------------
    // Derived aggregates
    // ------------------------------------------------------------------

    /// Reads the most recent claim of an installation.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InstallationNotFound`] when the installation
    /// has no claims.
    pub fn read_last_claim(&self, installation: &str) -> Result<Claim, ClaimError> {
        let _scope = self.backing.handle_connect()?;

        let ids = self
            .backing
            .list(KIND_CLAIMS, installation)
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::InstallationNotFound))?;
        let last = ids
            .iter()
            .max()
            .cloned()
            .ok_or(ClaimError::InstallationNotFound)?;

        self.read_claim(&last)
    }

    /// Reads the most recent result of a claim.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::NoResults`] when the claim has no results.
    pub fn read_last_result(&self, claim_id: &str) -> Result<OperationResult, ClaimError> {
        let _scope = self.backing.handle_connect()?;

        let ids = self.list_results(claim_id)?;
        let last = ids.iter().max().cloned().ok_or_else(|| ClaimError::NoResults {
            claim_id: claim_id.to_string(),
        })?;

        self.read_result(&last)
    }

    /// Reads the most recent value of every output associated with the
    /// installation.
    ///
    /// For each distinct output name ever produced by any result of any
    /// claim, the value comes from the chronologically latest result that
    /// wrote that name.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InstallationNotFound`] when the installation
    /// has no claims; surfaces the first hard failure otherwise.
    pub fn read_last_outputs(&self, installation: &str) -> Result<Outputs, ClaimError> {
        let _scope = self.backing.handle_connect()?;
        self.read_last_outputs_filtered(installation, None)
    }

    /// Reads the most recent value of one named output of the
    /// installation.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::OutputNotFound`] when no result of the
    /// installation ever wrote that name.
    pub fn read_last_output(&self, installation: &str, name: &str) -> Result<Output, ClaimError> {
        let _scope = self.backing.handle_connect()?;

        let outputs = self.read_last_outputs_filtered(installation, Some(name))?;
        outputs
            .get_by_name(name)
            .cloned()
            .ok_or(ClaimError::OutputNotFound)
    }

    fn read_last_outputs_filtered(
        &self,
        installation: &str,
        filter: Option<&str>,
    ) -> Result<Outputs, ClaimError> {
        let claims = self.read_all_claims(installation)?;

        // Results across all claims, in chronological (id) order.
        let mut results: Vec<(String, &Claim)> = Vec::new();
        for claim in &claims {
            for result_id in self.list_results(&claim.id)? {
                results.push((result_id, claim));
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));

        // The result holding the final value of each output name; later
        // sightings overwrite earlier ones.
        let mut last_outputs: BTreeMap<String, (String, &Claim)> = BTreeMap::new();
        for (result_id, claim) in &results {
            for name in self.list_outputs(result_id)? {
                if filter.is_none() || filter == Some(name.as_str()) {
                    last_outputs.insert(name, (result_id.clone(), *claim));
                }
            }
        }

        let mut outputs = Vec::with_capacity(last_outputs.len());
        for (name, (result_id, claim)) in &last_outputs {
            let result = Self::result_handle(claim, result_id);
            outputs.push(self.read_output(claim, &result, name)?);
        }
        Ok(Outputs::new(outputs))
    }

    /// A minimal result value used as a lookup handle when reconstructing
    /// outputs from listings.
    fn result_handle(claim: &Claim, result_id: &str) -> OperationResult {
        OperationResult {
            schema_version: SchemaVersion::default(),
            id: result_id.to_string(),
            claim_id: claim.id.clone(),
            message: String::new(),
            status: STATUS_UNKNOWN.to_string(),
            created: claim.created,
            output_metadata: OutputMetadata::new(),
            custom: None,
            claim: Some(Box::new(claim.clone())),
        }
    }

    /// Derives an installation view from the latest claim and result.
    ///
    /// Superseded by [`ClaimStore::read_installation`] now that status is
    /// stored on the installation record; retained for callers that render
    /// status from the claim log alone.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InstallationNotFound`] when the installation
    /// has no claims.
    pub fn read_installation_status(&self, installation: &str) -> Result<Installation, ClaimError> {
        let _scope = self.backing.handle_connect()?;

        let claim_ids = self.list_claims(installation)?;
        let last_claim_id = claim_ids.last().ok_or(ClaimError::InstallationNotFound)?;
        let mut claim = self.read_claim(last_claim_id)?;

        let result_ids = self.list_results(last_claim_id)?;
        let mut results = Vec::new();
        if let Some(last_result_id) = result_ids.last() {
            results.push(self.read_result(last_result_id)?);
        }
        claim.results = Some(results);

        let mut view = Installation::new(NAMESPACE_GLOBAL, installation, &claim.bundle, "", "")?;
        view.load_claims(vec![claim]);
        Ok(view)
    }

    /// Derives the installation view of every installation.
    ///
    /// # Errors
    ///
    /// Surfaces the first failure; partial results are not returned.
    pub fn read_all_installation_status(&self) -> Result<Vec<Installation>, ClaimError> {
        let _scope = self.backing.handle_connect()?;

        let names = self.list_installations(NAMESPACE_GLOBAL)?;
        let mut installations = Vec::with_capacity(names.len());
        for name in names {
            installations.push(self.read_installation_status(&name)?);
        }
        Ok(installations)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Persists an installation record.
    ///
    /// The caller owns `modified`; [`Installation::apply_claim`] and
    /// [`Installation::apply_result`] refresh it on the derivation path.
    ///
    /// # Errors
    ///
    /// Propagates serialization and backing-store failures.
    pub fn save_installation(&self, installation: &Installation) -> Result<(), ClaimError> {
        save_document(&self.backing, installation, &self.encrypt)?;
        Ok(())
    }

    /// Persists a claim and, for modifying actions, derives the owning
    /// installation's status from it.
    ///
    /// The installation must have been saved before its first modifying
    /// claim; there is no implicit creation.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InstallationNotFound`] when a modifying claim
    /// names an installation that was never saved.
    pub fn save_claim(&self, claim: &Claim) -> Result<(), ClaimError> {
        let _scope = self.backing.handle_connect()?;

        save_document(&self.backing, claim, &self.encrypt)?;

        // Observational actions such as logs or status never touch the
        // installation summary.
        if claim.is_modifying_action().unwrap_or(false) {
            let _status = self.status_lock.lock().expect("lock poisoned");

            let mut installation = self.read_installation(NAMESPACE_GLOBAL, &claim.installation)?;
            installation.apply_claim(claim);
            self.save_installation(&installation)?;
            tracing::debug!(
                installation = %claim.installation,
                claim_id = %claim.id,
                action = %claim.action,
                "installation status derived from claim"
            );
        }

        Ok(())
    }

    /// Persists a result and, when it belongs to a modifying claim,
    /// derives the owning installation's status from it.
    ///
    /// Re-saving a result under the same id overwrites the record; that is
    /// how `running` transitions to a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InstallationNotFound`] when the owning
    /// installation was never saved.
    pub fn save_result(&self, result: &OperationResult) -> Result<(), ClaimError> {
        let _scope = self.backing.handle_connect()?;

        save_document(&self.backing, result, &self.encrypt)?;

        if let Some(claim) = result.claim() {
            if claim.is_modifying_action().unwrap_or(false) {
                let _status = self.status_lock.lock().expect("lock poisoned");

                let mut installation =
                    self.read_installation(NAMESPACE_GLOBAL, &claim.installation)?;
                installation.apply_result(result);
                self.save_installation(&installation)?;
                tracing::debug!(
                    installation = %claim.installation,
                    result_id = %result.id,
                    status = %result.status,
                    "installation status derived from result"
                );
            }
        }

        Ok(())
    }

    /// Persists an output value, encrypting it when the claim's bundle
    /// marks the output sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::MissingClaim`] when the output carries no
    /// originating claim.
    pub fn save_output(&self, output: &Output) -> Result<(), ClaimError> {
        if output.claim().id.is_empty() {
            return Err(ClaimError::MissingClaim);
        }

        save_document(&self.backing, output, &self.encrypt)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deletes
    // ------------------------------------------------------------------

    /// Deletes an installation and every claim, result and output under
    /// it.
    ///
    /// Deletion is best effort: a failure mid-cascade leaves the records
    /// already removed deleted and surfaces the failure.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InstallationNotFound`] when the installation
    /// record is absent.
    pub fn delete_installation(&self, installation: &str) -> Result<(), ClaimError> {
        let _scope = self.backing.handle_connect()?;

        let claim_ids = match self.list_claims(installation) {
            Ok(ids) => ids,
            Err(ClaimError::InstallationNotFound) => Vec::new(),
            Err(error) => return Err(error),
        };
        for claim_id in claim_ids {
            self.delete_claim(&claim_id)?;
        }

        self.backing
            .delete(KIND_INSTALLATIONS, installation)
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::InstallationNotFound))?;
        tracing::debug!(%installation, "installation deleted");
        Ok(())
    }

    /// Deletes a claim and every result and output under it.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::ClaimNotFound`] when the claim record is
    /// absent.
    pub fn delete_claim(&self, claim_id: &str) -> Result<(), ClaimError> {
        let _scope = self.backing.handle_connect()?;

        for result_id in self.list_results(claim_id)? {
            self.delete_result(&result_id)?;
        }

        self.backing
            .delete(KIND_CLAIMS, claim_id)
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::ClaimNotFound))
    }

    /// Deletes a result and every output under it.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::ResultNotFound`] when the result record is
    /// absent.
    pub fn delete_result(&self, result_id: &str) -> Result<(), ClaimError> {
        let _scope = self.backing.handle_connect()?;

        for name in self.list_outputs(result_id)? {
            self.delete_output(result_id, &name)?;
        }

        self.backing
            .delete(KIND_RESULTS, result_id)
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::ResultNotFound))
    }

    /// Deletes a single output record.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::OutputNotFound`] when the record is absent.
    pub fn delete_output(&self, result_id: &str, name: &str) -> Result<(), ClaimError> {
        self.backing
            .delete(KIND_OUTPUTS, &output_key(result_id, name))
            .map_err(|e| ClaimError::normalize_not_found(e, ClaimError::OutputNotFound))
    }
}
