//! The output record: a named value produced by a result.

use std::collections::HashMap;

use crate::bundle::{OutputDefinition, TypeSchema};
use crate::storage::Document;

use super::record::Claim;
use super::result::OperationResult;
use super::store::{output_key, KIND_OUTPUTS};

/// A named value produced by a bundle operation.
///
/// The output owns by-value copies of its parent claim and result. They
/// are lookup handles, not part of the persisted record: the claim's
/// embedded bundle decides whether the value is sensitive, and the
/// result's id keys the value in storage. Only the value bytes reach the
/// backing store.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Claim of the operation that generated the output.
    claim: Claim,

    /// Result of the operation that generated the output.
    result: OperationResult,

    /// Name of the output.
    pub name: String,

    /// Value of the output as persisted to storage.
    pub value: Vec<u8>,
}

impl Output {
    /// Creates an output produced by the given claim and result.
    #[must_use]
    pub fn new(claim: Claim, mut result: OperationResult, name: &str, value: Vec<u8>) -> Self {
        result.claim = Some(Box::new(claim.clone()));
        Self {
            claim,
            result,
            name: name.to_string(),
            value,
        }
    }

    /// The claim of the operation that generated the output.
    #[must_use]
    pub fn claim(&self) -> &Claim {
        &self.claim
    }

    /// The result of the operation that generated the output.
    #[must_use]
    pub fn result(&self) -> &OperationResult {
        &self.result
    }

    /// The output's declaration in the bundle, when it is still defined.
    #[must_use]
    pub fn definition(&self) -> Option<&OutputDefinition> {
        self.claim.bundle.output(&self.name)
    }

    /// The type schema backing the output, when it is still defined.
    #[must_use]
    pub fn schema(&self) -> Option<&TypeSchema> {
        self.claim.bundle.output_schema(&self.name).ok()
    }
}

impl Document for Output {
    fn kind(&self) -> &'static str {
        KIND_OUTPUTS
    }

    fn group(&self) -> String {
        self.result.id.clone()
    }

    fn key(&self) -> String {
        output_key(&self.result.id, &self.name)
    }

    fn data(&self) -> Result<Vec<u8>, serde_json::Error> {
        Ok(self.value.clone())
    }

    fn should_encrypt(&self) -> bool {
        self.claim
            .bundle
            .is_output_sensitive(&self.name)
            .unwrap_or(false)
    }
}

/// The outputs of an installation, sorted by name and indexable by name or
/// position.
#[derive(Debug, Clone, Default)]
pub struct Outputs {
    /// Outputs sorted by name.
    vals: Vec<Output>,
    /// Output name to its position in `vals`.
    keys: HashMap<String, usize>,
}

impl Outputs {
    /// Builds a sorted container from a list of outputs.
    #[must_use]
    pub fn new(mut outputs: Vec<Output>) -> Self {
        outputs.sort_by(|a, b| a.name.cmp(&b.name));
        let keys = outputs
            .iter()
            .enumerate()
            .map(|(i, output)| (output.name.clone(), i))
            .collect();
        Self {
            vals: outputs,
            keys,
        }
    }

    /// Looks up an output by name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Output> {
        self.keys.get(name).and_then(|&i| self.vals.get(i))
    }

    /// Looks up an output by its position in name order.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Output> {
        self.vals.get(index)
    }

    /// The number of outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vals.len()
    }

    /// Whether the container is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    /// Iterates over the outputs in name order.
    pub fn iter(&self) -> std::slice::Iter<'_, Output> {
        self.vals.iter()
    }
}

impl<'a> IntoIterator for &'a Outputs {
    type Item = &'a Output;
    type IntoIter = std::slice::Iter<'a, Output>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
