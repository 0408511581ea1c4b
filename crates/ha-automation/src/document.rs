//! The automation document model
//!
//! A generated automation is kept as an ordered YAML mapping rather than a
//! typed struct: the language model may emit any trigger platform or action
//! shape, and everything it wrote has to survive normalization and be
//! written back in the order it came in.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Errors produced while reading or writing automation documents
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("generated text is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("generated text is empty")]
    Empty,

    #[error("generated YAML is a list with no automation in it")]
    EmptyList,

    #[error("expected an automation mapping, got {0}")]
    NotAMapping(&'static str),

    #[error("automation cannot be represented as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Well-known top-level keys
pub mod keys {
    pub const ID: &str = "id";
    pub const ALIAS: &str = "alias";
    pub const DESCRIPTION: &str = "description";
    pub const TRIGGER: &str = "trigger";
    pub const TRIGGERS: &str = "triggers";
    pub const CONDITION: &str = "condition";
    pub const CONDITIONS: &str = "conditions";
    pub const ACTION: &str = "action";
    pub const ACTIONS: &str = "actions";
    pub const MODE: &str = "mode";
}

/// An automation as an ordered key/value mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AutomationDocument(Mapping);

impl AutomationDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self(Mapping::new())
    }

    /// Borrow the underlying mapping
    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    /// Mutably borrow the underlying mapping
    pub fn as_mapping_mut(&mut self) -> &mut Mapping {
        &mut self.0
    }

    /// Build a document from any YAML value that is a mapping
    pub fn from_value(value: Value) -> DocumentResult<Self> {
        match value {
            Value::Mapping(mapping) => Ok(Self(mapping)),
            Value::Tagged(tagged) => Self::from_value(tagged.value),
            other => Err(DocumentError::NotAMapping(value_kind(&other))),
        }
    }

    /// Build a document from a JSON object
    pub fn from_json(value: serde_json::Value) -> DocumentResult<Self> {
        let value: Value = serde_yaml::to_value(value)?;
        Self::from_value(value)
    }

    /// Convert to JSON, e.g. as service data for `automation.create`
    pub fn to_json(&self) -> DocumentResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.0)?)
    }

    /// Serialize as a standalone YAML mapping
    pub fn to_yaml_string(&self) -> DocumentResult<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Get a string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a value; an existing key keeps its position
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(Value::String(key.to_string()), value.into())
    }

    /// Insert a key as the first entry, replacing any existing value
    pub fn insert_first(&mut self, key: &str, value: impl Into<Value>) {
        let key = Value::String(key.to_string());
        let rest = std::mem::take(&mut self.0);
        let mut mapping = Mapping::with_capacity(rest.len() + 1);
        mapping.insert(key.clone(), value.into());
        for (k, v) in rest {
            if k != key {
                mapping.insert(k, v);
            }
        }
        self.0 = mapping;
    }

    /// Remove a key, keeping the order of the remaining entries
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let key = Value::String(key.to_string());
        let rest = std::mem::take(&mut self.0);
        let mut removed = None;
        for (k, v) in rest {
            if k == key {
                removed = Some(v);
            } else {
                self.0.insert(k, v);
            }
        }
        removed
    }

    /// Rename a key in place, keeping its position
    pub(crate) fn rename(&mut self, from: &str, to: &str) {
        let from = Value::String(from.to_string());
        let to = Value::String(to.to_string());
        let rest = std::mem::take(&mut self.0);
        for (k, v) in rest {
            if k == from {
                self.0.insert(to.clone(), v);
            } else {
                self.0.insert(k, v);
            }
        }
    }

    /// The automation's `id`, rendered as a string
    ///
    /// Numeric ids (as written by the timestamp strategy and read back from
    /// `automations.yaml`) are accepted too.
    pub fn id(&self) -> Option<String> {
        scalar_to_string(self.0.get(keys::ID)?).filter(|id| !id.is_empty())
    }

    pub fn alias(&self) -> Option<&str> {
        self.get_str(keys::ALIAS)
    }

    pub fn description(&self) -> Option<&str> {
        self.get_str(keys::DESCRIPTION)
    }

    /// Trigger list under the canonical key
    pub fn triggers(&self) -> &[Value] {
        sequence_at(&self.0, keys::TRIGGERS)
    }

    /// Action list under the canonical key
    pub fn actions(&self) -> &[Value] {
        sequence_at(&self.0, keys::ACTIONS)
    }

    /// Name shown in logs and notifications
    pub fn display_name(&self) -> String {
        self.alias()
            .map(String::from)
            .or_else(|| self.id())
            .unwrap_or_else(|| "unnamed automation".to_string())
    }
}

impl From<Mapping> for AutomationDocument {
    fn from(mapping: Mapping) -> Self {
        Self(mapping)
    }
}

fn sequence_at<'a>(mapping: &'a Mapping, key: &str) -> &'a [Value] {
    mapping
        .get(key)
        .and_then(Value::as_sequence)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Render a scalar YAML value as a string
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Human-readable kind of a YAML value, for error messages
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
