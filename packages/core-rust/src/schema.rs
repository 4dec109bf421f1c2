//! JSON-Schema-like table schemas and their resolved field kinds.
//!
//! A schema document is a single JSON object keyed by collection key, each
//! value describing one table: `{ title, properties, required }`. Field
//! specs are resolved once into a [`FieldKind`] so that forms and tables
//! never re-branch on the raw `type` string.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::TableKind;

/// Errors raised while loading a schema document.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid schema document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A `type` declaration: either a single name or a list such as
/// `["string", "null"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeDecl {
    One(String),
    Many(Vec<String>),
}

impl TypeDecl {
    /// The first declared type that is not `"null"`.
    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        match self {
            Self::One(name) => Some(name.as_str()),
            Self::Many(names) => names.iter().map(String::as_str).find(|n| *n != "null"),
        }
    }
}

/// Raw field declaration as it appears in the schema document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_decl: Option<TypeDecl>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl FieldSpec {
    /// The primary declared type name, if any.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_decl.as_ref().and_then(TypeDecl::primary)
    }

    /// Resolves this declaration into exactly one [`FieldKind`].
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self.type_name() {
            Some("array") => match self.items.as_ref().and_then(|i| i.enum_values.clone()) {
                Some(options) => FieldKind::ArrayOfEnum { options },
                None => FieldKind::ArrayOfString,
            },
            _ if self.enum_values.is_some() => FieldKind::Enum {
                options: self.enum_values.clone().unwrap_or_default(),
            },
            Some("string") => FieldKind::Text {
                min_length: self.min_length,
                max_length: self.max_length,
            },
            Some("integer") => FieldKind::Integer {
                minimum: self.minimum,
                maximum: self.maximum,
            },
            Some("number") => FieldKind::Number {
                minimum: self.minimum,
                maximum: self.maximum,
            },
            _ => FieldKind::PlainText,
        }
    }
}

/// Widget class chosen for a field. One variant per renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Free text input with optional length bounds.
    Text {
        min_length: Option<u64>,
        max_length: Option<u64>,
    },
    /// Whole-number input with optional bounds.
    Integer {
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    /// Decimal input with optional bounds.
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    /// Single-select over a closed list.
    Enum { options: Vec<String> },
    /// Multi-select over a closed list.
    ArrayOfEnum { options: Vec<String> },
    /// Repeatable text input.
    ArrayOfString,
    /// Field without a usable declaration; shown as read-only text.
    PlainText,
}

impl FieldKind {
    /// Value a form starts with when the record does not carry the field.
    ///
    /// Integers start as `null`, arrays as `[]`, everything else as `""`.
    /// The distinction matters for the required check.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            Self::Integer { .. } => Value::Null,
            Self::ArrayOfEnum { .. } | Self::ArrayOfString => Value::Array(Vec::new()),
            _ => Value::String(String::new()),
        }
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::ArrayOfEnum { .. } | Self::ArrayOfString)
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer { .. } | Self::Number { .. })
    }
}

/// A schema field after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Name of the field (the record key).
    pub name: String,
    /// Display label: `label`, then `title`, then the field name.
    pub label: String,
    pub description: Option<String>,
    /// Whether the field must be non-empty on submit.
    pub required: bool,
    pub kind: FieldKind,
}

/// Schema for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub properties: IndexMap<String, FieldSpec>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Schema {
    /// Parses a single table schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] if `json` is not a valid schema.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn is_required(&self, field: &str) -> bool {
        self.required.iter().any(|r| r == field)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldDef> {
        self.properties
            .get(name)
            .map(|spec| self.resolve_field(name, spec))
    }

    /// Resolves every property in declaration order.
    #[must_use]
    pub fn fields(&self) -> Vec<FieldDef> {
        self.properties
            .iter()
            .map(|(name, spec)| self.resolve_field(name, spec))
            .collect()
    }

    fn resolve_field(&self, name: &str, spec: &FieldSpec) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            label: spec
                .label
                .clone()
                .or_else(|| spec.title.clone())
                .unwrap_or_else(|| name.to_string()),
            description: spec.description.clone(),
            required: self.is_required(name),
            kind: spec.kind(),
        }
    }
}

/// Loaded schema document, one [`Schema`] per catalog table.
///
/// Tables without an entry resolve to an empty schema, so a table view over
/// them has no columns and a form has no fields.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<TableKind, Schema>,
    empty: Schema,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a schema document keyed by collection key (or any name
    /// accepted by [`TableKind::resolve`]). Unknown keys are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] if the document is not a JSON object of
    /// schemas.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let raw: IndexMap<String, Schema> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for (name, schema) in raw {
            match TableKind::resolve(&name) {
                Some(kind) => registry.insert(kind, schema),
                None => warn!(table = %name, "skipping schema for unknown table"),
            }
        }
        debug!(tables = registry.schemas.len(), "schema document loaded");
        Ok(registry)
    }

    /// Reads and parses a schema document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Io`] if the file cannot be read, or
    /// [`SchemaError::Parse`] if it is malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Registers or replaces the schema for a table.
    pub fn insert(&mut self, kind: TableKind, schema: Schema) {
        self.schemas.insert(kind, schema);
    }

    /// Schema for `kind`, or an empty schema if none was loaded.
    #[must_use]
    pub fn get(&self, kind: TableKind) -> &Schema {
        self.schemas.get(&kind).unwrap_or(&self.empty)
    }

    #[must_use]
    pub fn contains(&self, kind: TableKind) -> bool {
        self.schemas.contains_key(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(json: &str) -> FieldSpec {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn enum_field_resolves_to_single_select() {
        let kind = spec(r#"{"type":"string","enum":["Male","Female","Unknown"]}"#).kind();
        assert_eq!(
            kind,
            FieldKind::Enum {
                options: vec!["Male".into(), "Female".into(), "Unknown".into()]
            }
        );
    }

    #[test]
    fn array_with_enum_items_resolves_to_multi_select() {
        let kind = spec(r#"{"type":"array","items":{"type":"string","enum":["A","B"]}}"#).kind();
        assert_eq!(
            kind,
            FieldKind::ArrayOfEnum {
                options: vec!["A".into(), "B".into()]
            }
        );
    }

    #[test]
    fn array_of_strings_resolves_to_repeatable_input() {
        let kind = spec(r#"{"type":"array","items":{"type":"string"}}"#).kind();
        assert_eq!(kind, FieldKind::ArrayOfString);
    }

    #[test]
    fn numeric_fields_carry_bounds() {
        let kind = spec(r#"{"type":"integer","minimum":0,"maximum":120}"#).kind();
        assert_eq!(
            kind,
            FieldKind::Integer {
                minimum: Some(0.0),
                maximum: Some(120.0)
            }
        );
        let kind = spec(r#"{"type":"number","minimum":0.5}"#).kind();
        assert_eq!(
            kind,
            FieldKind::Number {
                minimum: Some(0.5),
                maximum: None
            }
        );
    }

    #[test]
    fn string_field_carries_length_bounds() {
        let kind = spec(r#"{"type":"string","minLength":2,"maxLength":8}"#).kind();
        assert_eq!(
            kind,
            FieldKind::Text {
                min_length: Some(2),
                max_length: Some(8)
            }
        );
    }

    #[test]
    fn nullable_type_list_uses_first_non_null() {
        let kind = spec(r#"{"type":["null","integer"]}"#).kind();
        assert!(matches!(kind, FieldKind::Integer { .. }));
    }

    #[test]
    fn missing_type_is_plain_text() {
        assert_eq!(spec(r#"{"description":"free"}"#).kind(), FieldKind::PlainText);
        assert_eq!(spec(r#"{"type":"object"}"#).kind(), FieldKind::PlainText);
    }

    #[test]
    fn default_values_are_three_way() {
        assert_eq!(
            FieldKind::Integer {
                minimum: None,
                maximum: None
            }
            .default_value(),
            Value::Null
        );
        assert_eq!(FieldKind::ArrayOfString.default_value(), serde_json::json!([]));
        assert_eq!(
            FieldKind::Text {
                min_length: None,
                max_length: None
            }
            .default_value(),
            serde_json::json!("")
        );
    }

    #[test]
    fn fields_preserve_declaration_order_and_labels() {
        let schema = Schema::from_json_str(
            r#"{
                "title": "Participant",
                "properties": {
                    "participant_id": {"type":"string","label":"Participant ID"},
                    "age": {"type":"integer","title":"Age at enrollment"},
                    "sex": {"type":"string","enum":["Male","Female"]}
                },
                "required": ["participant_id"]
            }"#,
        )
        .unwrap();

        let fields = schema.fields();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["participant_id", "age", "sex"]);
        assert_eq!(fields[0].label, "Participant ID");
        assert!(fields[0].required);
        assert_eq!(fields[1].label, "Age at enrollment");
        assert!(!fields[1].required);
        assert_eq!(fields[2].label, "sex");
    }

    #[test]
    fn registry_resolves_keys_and_skips_unknown() {
        let registry = SchemaRegistry::from_json_str(
            r#"{
                "participants": {"properties": {"participant_id": {"type":"string"}}},
                "analyte": {"properties": {"analyte_id": {"type":"string"}}},
                "unknown_table": {"properties": {}}
            }"#,
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(TableKind::Participants));
        assert!(registry.contains(TableKind::Analytes));
        assert!(registry.get(TableKind::Families).properties.is_empty());
    }

    #[test]
    fn registry_rejects_malformed_document() {
        let err = SchemaRegistry::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, SchemaError::Parse(_)));
    }

    #[test]
    fn registry_reports_missing_file() {
        let err = SchemaRegistry::from_path("/nonexistent/v1.7schemas.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/v1.7schemas.json"));
    }
}
