//! Schema validation and record normalization.
//!
//! A [`Schema`] is fixed at store construction and never mutated afterwards.
//! All validation happens here, before the store touches its table: schema
//! definitions, incoming records, query predicates, and update payloads.

use crate::error::{Result, StoreError};
use crate::types::{FieldSpec, FieldType, Record, Schema, Value};
use indexmap::IndexMap;

/// Properties a field declaration may carry in a JSON schema definition.
const KNOWN_PROPS: [&str; 3] = ["type", "required", "default"];

impl Schema {
    /// Build a schema from field declarations.
    ///
    /// Fails if a field name is empty or a declared default does not match
    /// the field's type.
    pub fn new(fields: IndexMap<String, FieldSpec>) -> Result<Self> {
        for (name, spec) in &fields {
            if name.is_empty() {
                return Err(StoreError::Schema(
                    "field names must be non-empty strings".to_string(),
                ));
            }
            if let Some(default) = &spec.default {
                if !default.matches(spec.field_type) {
                    return Err(StoreError::Schema(format!(
                        "default for field '{}' must be of type {}, got {}",
                        name,
                        spec.field_type,
                        default.type_name()
                    )));
                }
            }
        }
        Ok(Schema { fields })
    }

    /// Parse and validate a raw JSON schema definition.
    ///
    /// The definition is an object mapping field names to declarations with
    /// properties `type` (required), `required`, and `default`. Any other
    /// property is rejected. Field order in the document becomes schema order.
    pub fn from_json_value(raw: &serde_json::Value) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| StoreError::Schema("schema definition must be an object".to_string()))?;

        let mut fields = IndexMap::with_capacity(object.len());
        for (name, decl) in object {
            fields.insert(name.clone(), parse_field_decl(name, decl)?);
        }
        Schema::new(fields)
    }

    /// Parse a JSON schema definition from text.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| StoreError::Schema(format!("schema definition is not valid JSON: {e}")))?;
        Self::from_json_value(&value)
    }

    /// Check a raw record against this schema.
    ///
    /// A record complies when every key is a declared field, every required
    /// field is present, and every present value matches its declared type.
    pub fn validate_record(&self, record: &Record) -> bool {
        for key in record.keys() {
            if !self.fields.contains_key(key) {
                return false;
            }
        }
        for (name, spec) in &self.fields {
            match record.get(name) {
                Some(value) => {
                    if !value.matches(spec.field_type) {
                        return false;
                    }
                }
                None => {
                    if spec.required {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Fill absent fields with their declared default, or `Null` when no
    /// default exists. Returns a new record in schema field order.
    pub fn apply_defaults(&self, record: &Record) -> Record {
        let mut filled = Record::with_capacity(self.fields.len());
        for (name, spec) in &self.fields {
            let value = match record.get(name) {
                Some(value) => value.clone(),
                None => spec.default.clone().unwrap_or(Value::Null),
            };
            filled.insert(name.clone(), value);
        }
        filled
    }

    /// Check a query predicate: exactly one field, known to the schema, with
    /// a value of the declared type. Each violation reports its own cause.
    pub fn validate_predicate(&self, predicate: &Record) -> Result<()> {
        if predicate.len() != 1 {
            return Err(StoreError::Query(format!(
                "query must contain exactly one field, got {}",
                predicate.len()
            )));
        }
        let (name, value) = predicate.first().expect("predicate has one entry");
        let spec = self
            .fields
            .get(name)
            .ok_or_else(|| StoreError::Query(format!("unknown field '{name}' in query")))?;
        if !value.matches(spec.field_type) {
            return Err(StoreError::Query(format!(
                "query value for '{}' must be of type {}, got {}",
                name,
                spec.field_type,
                value.type_name()
            )));
        }
        Ok(())
    }

    /// Check an update payload: every key known, every value type-correct.
    pub fn validate_update_payload(&self, payload: &Record) -> Result<()> {
        for (name, value) in payload {
            let spec = self
                .fields
                .get(name)
                .ok_or_else(|| StoreError::Data(format!("unknown field '{name}' in update")))?;
            if !value.matches(spec.field_type) {
                return Err(StoreError::Data(format!(
                    "update value for '{}' must be of type {}, got {}",
                    name,
                    spec.field_type,
                    value.type_name()
                )));
            }
        }
        Ok(())
    }
}

/// Validate and convert one field declaration from a JSON schema definition.
fn parse_field_decl(name: &str, decl: &serde_json::Value) -> Result<FieldSpec> {
    let props = decl.as_object().ok_or_else(|| {
        StoreError::Schema(format!("declaration of field '{name}' must be an object"))
    })?;

    for prop in props.keys() {
        if !KNOWN_PROPS.contains(&prop.as_str()) {
            return Err(StoreError::Schema(format!(
                "unknown property '{prop}' in declaration of field '{name}'"
            )));
        }
    }

    let type_name = props
        .get("type")
        .ok_or_else(|| StoreError::Schema(format!("field '{name}' does not declare a type")))?
        .as_str()
        .ok_or_else(|| StoreError::Schema(format!("type of field '{name}' must be a string")))?;

    let field_type = match type_name {
        "int" => FieldType::Int,
        "str" => FieldType::Str,
        "bool" => FieldType::Bool,
        "float" => FieldType::Float,
        other => {
            return Err(StoreError::Schema(format!(
                "field '{name}' has unsupported type '{other}' (expected int, str, bool or float)"
            )))
        }
    };

    let required = match props.get("required") {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(_) => {
            return Err(StoreError::Schema(format!(
                "'required' on field '{name}' must be a boolean"
            )))
        }
        None => false,
    };

    let default = match props.get("default") {
        Some(raw) => {
            let value = json_literal(raw).ok_or_else(|| {
                StoreError::Schema(format!(
                    "default for field '{name}' must be a literal matching its type"
                ))
            })?;
            if !value.matches(field_type) {
                return Err(StoreError::Schema(format!(
                    "default for field '{}' must be of type {}, got {}",
                    name,
                    field_type,
                    value.type_name()
                )));
            }
            Some(value)
        }
        None => None,
    };

    Ok(FieldSpec {
        field_type,
        required,
        default,
    })
}

/// Convert a JSON scalar into a field value. Objects, arrays and null have no
/// field-value counterpart.
fn json_literal(raw: &serde_json::Value) -> Option<Value> {
    match raw {
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::String(s) => Some(Value::Str(s.clone())),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(Value::Float)
            }
        }
        _ => None,
    }
}
