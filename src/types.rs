//! Core types for the record store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a schema field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Str,
    Bool,
    Float,
}

impl FieldType {
    /// The name used in schema definitions ("int", "str", ...).
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Str => "str",
            FieldType::Bool => "bool",
            FieldType::Float => "float",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A field value. `Null` marks a field that was absent and had no default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
    Float(f64),
    Null,
}

impl Value {
    /// Whether this value satisfies a declared field type.
    pub fn matches(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (Value::Int(_), FieldType::Int)
                | (Value::Str(_), FieldType::Str)
                | (Value::Bool(_), FieldType::Bool)
                | (Value::Float(_), FieldType::Float)
        )
    }

    /// The type name for error messages ("int", "str", ..., "null").
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::Float(_) => "float",
            Value::Null => "null",
        }
    }

    /// String rendering used for content hashing.
    ///
    /// Identity is derived from these renderings concatenated in schema
    /// field order, so this must stay stable across versions.
    pub fn render(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Null => "null".to_string(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// Declaration of a single schema field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    /// An optional field with no default.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
        }
    }

    /// A required field.
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
            default: None,
        }
    }

    /// Attach a default value. The default's type must match the field type;
    /// this is enforced when the schema is constructed.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Ordered mapping of field name to declaration. Immutable for the lifetime
/// of a store instance once construction succeeds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub(crate) fields: IndexMap<String, FieldSpec>,
}

impl Schema {
    /// Field declarations in schema order.
    pub fn fields(&self) -> &IndexMap<String, FieldSpec> {
        &self.fields
    }

    /// Look up a field declaration.
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Identity of a record: the first 8 hex characters of the SHA-256 digest of
/// its field values. Never independently assigned.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub(crate) String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

/// A record: field name to value, exactly the schema's fields after default
/// application.
pub type Record = IndexMap<String, Value>;

/// The in-memory table: insertion-ordered mapping of record id to record.
pub type Table = IndexMap<RecordId, Record>;
