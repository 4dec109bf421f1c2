//! Schema-driven edit forms.
//!
//! A [`Form`] is built from a [`Schema`] and, for edits, the row being
//! edited. It holds one resolved [`FieldDef`] per property, the current
//! values, and validates them with the rules the schema implies. Submission
//! is all-or-nothing: any field error blocks the payload.

use std::fmt;

use serde_json::{Number, Value};

use crate::schema::{FieldDef, FieldKind, Schema};
use crate::types::Record;

/// A validation failure scoped to one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of validating form values against a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// The values conform to the schema.
    Valid,
    /// One or more fields violate the schema.
    Invalid {
        /// Field-level failures in schema declaration order.
        errors: Vec<FieldError>,
    },
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        match self {
            Self::Valid => &[],
            Self::Invalid { errors } => errors,
        }
    }
}

/// Error returned by a blocked submission.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("validation failed: {}", join_messages(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    /// Messages reported for `field`.
    #[must_use]
    pub fn for_field(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Edit form state for one table row.
#[derive(Debug, Clone)]
pub struct Form {
    fields: Vec<FieldDef>,
    values: Record,
}

impl Form {
    /// A blank form for creating a row. Every field starts at its default.
    #[must_use]
    pub fn new(schema: &Schema) -> Self {
        Self::with_record(schema, &Record::new())
    }

    /// A form pre-populated with `record`.
    ///
    /// Schema fields missing from the record take their kind's default
    /// (`""`, `null` for integers, `[]` for arrays). Record keys the schema
    /// does not declare are carried through untouched.
    #[must_use]
    pub fn with_record(schema: &Schema, record: &Record) -> Self {
        let fields = schema.fields();
        let mut values = Record::new();
        for field in &fields {
            let value = record
                .get(&field.name)
                .filter(|v| !v.is_null() || !field.kind.is_array())
                .cloned()
                .unwrap_or_else(|| field.kind.default_value());
            values.insert(field.name.clone(), value);
        }
        for (key, value) in record {
            if !values.contains_key(key) {
                values.insert(key.clone(), value.clone());
            }
        }
        Self { fields, values }
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn values(&self) -> &Record {
        &self.values
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Keys present in the form that the schema does not declare.
    pub fn extra_keys(&self) -> impl Iterator<Item = &String> {
        self.values
            .keys()
            .filter(move |k| !self.fields.iter().any(|f| &f.name == *k))
    }

    /// Sets a field to an already-typed value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Sets a field from raw text input, converting according to its kind.
    ///
    /// Repeatable text lists split on commas; numeric inputs parse to JSON
    /// numbers and fall back to the raw text (which validation then rejects);
    /// blank input resets the field to its default.
    pub fn set_text(&mut self, name: &str, text: &str) {
        let value = match self.field(name).map(|f| &f.kind) {
            Some(kind) if text.trim().is_empty() && !matches!(kind, FieldKind::PlainText) => {
                kind.default_value()
            }
            Some(FieldKind::ArrayOfString | FieldKind::ArrayOfEnum { .. }) => Value::Array(
                parse_list_input(text)
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
            Some(FieldKind::Integer { .. } | FieldKind::Number { .. }) => {
                parse_number(text.trim()).unwrap_or_else(|| Value::String(text.to_string()))
            }
            _ => Value::String(text.to_string()),
        };
        self.values.insert(name.to_string(), value);
    }

    /// Validates the current values.
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        validate_fields(&self.fields, &self.values)
    }

    /// Returns the submission payload, or every field error if any rule fails.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] when at least one field is invalid; nothing
    /// should be sent in that case.
    pub fn submit(&self) -> Result<Record, ValidationErrors> {
        match self.validate() {
            ValidationResult::Valid => Ok(self.values.clone()),
            ValidationResult::Invalid { errors } => Err(ValidationErrors(errors)),
        }
    }
}

/// Validates an arbitrary payload against `schema` and hands it back
/// unchanged when it passes.
///
/// # Errors
///
/// Returns [`ValidationErrors`] listing every failing field.
pub fn validate_payload(schema: &Schema, payload: Record) -> Result<Record, ValidationErrors> {
    match validate_fields(&schema.fields(), &payload) {
        ValidationResult::Valid => Ok(payload),
        ValidationResult::Invalid { errors } => Err(ValidationErrors(errors)),
    }
}

/// Splits comma-separated list input, trimming items and dropping blanks.
#[must_use]
pub fn parse_list_input(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn validate_fields(fields: &[FieldDef], values: &Record) -> ValidationResult {
    let mut errors = Vec::new();
    for field in fields {
        let value = values.get(&field.name).unwrap_or(&Value::Null);
        if is_empty(value) {
            if field.required {
                errors.push(error(field, format!("{} is required", field.name)));
            }
            continue;
        }
        if let Some(message) = check_kind(field, value) {
            errors.push(error(field, message));
        }
    }
    if errors.is_empty() {
        ValidationResult::Valid
    } else {
        ValidationResult::Invalid { errors }
    }
}

fn error(field: &FieldDef, message: String) -> FieldError {
    FieldError {
        field: field.name.clone(),
        message,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn check_kind(field: &FieldDef, value: &Value) -> Option<String> {
    let name = &field.name;
    match &field.kind {
        FieldKind::Text {
            min_length,
            max_length,
        } => {
            let len = match value {
                Value::String(s) => s.chars().count(),
                other => other.to_string().chars().count(),
            } as u64;
            if let Some(min) = min_length.filter(|min| len < *min) {
                return Some(format!("{name} must be at least {min} characters"));
            }
            if let Some(max) = max_length.filter(|max| len > *max) {
                return Some(format!("{name} must be at most {max} characters"));
            }
            None
        }
        FieldKind::Integer { minimum, maximum } => {
            let Some(n) = as_number(value) else {
                return Some(format!("{name} must be a number"));
            };
            if n.fract() != 0.0 {
                return Some(format!("{name} must be an integer"));
            }
            check_bounds(name, n, *minimum, *maximum)
        }
        FieldKind::Number { minimum, maximum } => match as_number(value) {
            Some(n) => check_bounds(name, n, *minimum, *maximum),
            None => Some(format!("{name} must be a number")),
        },
        FieldKind::Enum { options } => {
            let text = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            if options.contains(&text) {
                None
            } else {
                Some(one_of(name, options))
            }
        }
        FieldKind::ArrayOfEnum { options } => match value {
            Value::Array(items) => {
                let all_known = items
                    .iter()
                    .all(|item| item.as_str().is_some_and(|s| options.iter().any(|o| o == s)));
                if all_known {
                    None
                } else {
                    Some(one_of(name, options))
                }
            }
            _ => Some(format!("{name} must be a list")),
        },
        FieldKind::ArrayOfString => match value {
            Value::Array(items) if items.iter().all(Value::is_string) => None,
            Value::Array(_) => Some(format!("{name} must be a list of text values")),
            _ => Some(format!("{name} must be a list")),
        },
        FieldKind::PlainText => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn check_bounds(name: &str, n: f64, minimum: Option<f64>, maximum: Option<f64>) -> Option<String> {
    if let Some(min) = minimum.filter(|min| n < *min) {
        return Some(format!("{name} must be at least {}", format_bound(min)));
    }
    if let Some(max) = maximum.filter(|max| n > *max) {
        return Some(format!("{name} must be at most {}", format_bound(max)));
    }
    None
}

fn one_of(name: &str, options: &[String]) -> String {
    format!("{name} must be one of: {}", options.join(", "))
}

/// Renders a bound without a trailing `.0` for whole numbers.
#[allow(clippy::cast_possible_truncation)]
fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 && bound.abs() < 1e15 {
        format!("{}", bound as i64)
    } else {
        bound.to_string()
    }
}
