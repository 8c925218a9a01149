//! The bundle value embedded in claims.
//!
//! The store does not parse or validate bundles; it treats them as opaque
//! documents that expose just enough structure to answer two questions:
//! which custom actions modify installation state, and which outputs are
//! sensitive and must be encrypted at rest. A claim embeds a copy of the
//! bundle as it was at operation time, so historical outputs resolve
//! sensitivity against the definitions they were produced under rather
//! than whatever the bundle looks like today.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while interrogating a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BundleError {
    /// The named output is not declared by the bundle.
    #[error("output {name} is not defined in the bundle")]
    UndefinedOutput {
        /// The output name that was looked up.
        name: String,
    },

    /// The output references a type schema the bundle does not define.
    #[error("output {name} references undefined schema {definition}")]
    UndefinedDefinition {
        /// The output name that was looked up.
        name: String,
        /// The missing schema name.
        definition: String,
    },
}

/// An application bundle definition, reduced to the fields the history
/// store consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Name of the bundle.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Version of the bundle.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Labels applied to installations of the bundle.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Custom actions the bundle supports beyond install/upgrade/uninstall.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, BundleAction>,

    /// Outputs the bundle can produce, by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, OutputDefinition>,

    /// Type schemas referenced by parameter and output definitions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, TypeSchema>,
}

/// A custom action declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleAction {
    /// Whether a successful run of the action may change installation state.
    #[serde(default)]
    pub modifies: bool,

    /// Whether the action may run without an existing installation.
    #[serde(default)]
    pub stateless: bool,

    /// Human-readable description of the action.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// An output declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDefinition {
    /// Name of the type schema describing the output value.
    pub definition: String,

    /// Actions the output applies to; empty means every action.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,

    /// Path the output is collected from inside the invocation image.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl OutputDefinition {
    /// Reports whether the output is produced by the given action.
    #[must_use]
    pub fn applies_to(&self, action: &str) -> bool {
        self.apply_to.is_empty() || self.apply_to.iter().any(|a| a == action)
    }
}

/// A type schema, reduced to the fields the store consults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSchema {
    /// The JSON type of the value.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub schema_type: String,

    /// Marks the value as write-only: readable by the runtime, never echoed
    /// back to users, and encrypted at rest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_only: Option<bool>,

    /// Human-readable description of the value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Bundle {
    /// Looks up a custom action declaration.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&BundleAction> {
        self.actions.get(name)
    }

    /// Looks up an output declaration.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&OutputDefinition> {
        self.outputs.get(name)
    }

    /// Resolves the type schema backing an output.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::UndefinedOutput`] when the output is not
    /// declared and [`BundleError::UndefinedDefinition`] when it references
    /// a schema the bundle does not carry.
    pub fn output_schema(&self, name: &str) -> Result<&TypeSchema, BundleError> {
        let output = self
            .outputs
            .get(name)
            .ok_or_else(|| BundleError::UndefinedOutput {
                name: name.to_string(),
            })?;
        self.definitions
            .get(&output.definition)
            .ok_or_else(|| BundleError::UndefinedDefinition {
                name: name.to_string(),
                definition: output.definition.clone(),
            })
    }

    /// Reports whether an output is sensitive and must be encrypted at
    /// rest.
    ///
    /// # Errors
    ///
    /// Propagates the lookup errors of [`Bundle::output_schema`]. Callers
    /// that only need a best-effort answer treat an error as "not
    /// sensitive", since a value stored before the definition was removed
    /// was stored unencrypted.
    pub fn is_output_sensitive(&self, name: &str) -> Result<bool, BundleError> {
        Ok(self.output_schema(name)?.write_only == Some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensitive_bundle() -> Bundle {
        let mut bundle = Bundle::default();
        bundle.definitions.insert(
            "password".to_string(),
            TypeSchema {
                schema_type: "string".to_string(),
                write_only: Some(true),
                ..TypeSchema::default()
            },
        );
        bundle.definitions.insert(
            "port".to_string(),
            TypeSchema {
                schema_type: "integer".to_string(),
                write_only: Some(false),
                ..TypeSchema::default()
            },
        );
        bundle.outputs.insert(
            "password".to_string(),
            OutputDefinition {
                definition: "password".to_string(),
                ..OutputDefinition::default()
            },
        );
        bundle.outputs.insert(
            "port".to_string(),
            OutputDefinition {
                definition: "port".to_string(),
                ..OutputDefinition::default()
            },
        );
        bundle
    }

    #[test]
    fn write_only_outputs_are_sensitive() {
        let bundle = sensitive_bundle();
        assert!(bundle.is_output_sensitive("password").unwrap());
        assert!(!bundle.is_output_sensitive("port").unwrap());
    }

    #[test]
    fn undeclared_output_is_an_error() {
        let bundle = sensitive_bundle();
        assert!(matches!(
            bundle.is_output_sensitive("missing"),
            Err(BundleError::UndefinedOutput { .. })
        ));
    }

    #[test]
    fn dangling_definition_is_an_error() {
        let mut bundle = Bundle::default();
        bundle.outputs.insert(
            "orphan".to_string(),
            OutputDefinition {
                definition: "gone".to_string(),
                ..OutputDefinition::default()
            },
        );
        assert!(matches!(
            bundle.is_output_sensitive("orphan"),
            Err(BundleError::UndefinedDefinition { .. })
        ));
    }

    #[test]
    fn apply_to_defaults_to_every_action() {
        let unrestricted = OutputDefinition::default();
        assert!(unrestricted.applies_to("install"));

        let restricted = OutputDefinition {
            apply_to: vec!["upgrade".to_string()],
            ..OutputDefinition::default()
        };
        assert!(restricted.applies_to("upgrade"));
        assert!(!restricted.applies_to("install"));
    }

    #[test]
    fn wire_names_are_camel_case() {
        let bundle = sensitive_bundle();
        let encoded = serde_json::to_value(&bundle).unwrap();
        assert!(encoded.get("outputs").is_some());
        let schema = &encoded["definitions"]["password"];
        assert_eq!(schema["writeOnly"], serde_json::json!(true));
        assert_eq!(schema["type"], serde_json::json!("string"));
    }
}
