//! Response envelopes returned by the metadata API.
//!
//! Create and update endpoints answer with a JSON array holding one entry per
//! submitted row:
//!
//! ```json
//! [{"identifier": "GSS123", "request_status": "UPDATED", "status_code": 200,
//!   "message": "participant GSS123 updated.",
//!   "data": {"updates": {"sex": "Male to Female"}, "instance": {...}}}]
//! ```
//!
//! The fetch-all endpoint answers with one array per collection key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::catalog::TableKind;
use crate::types::{display_value, Record};

/// Substring the server puts in `message` when a submission changed nothing.
pub const NO_CHANGES_MARKER: &str = "had no changes.";

/// Fallback text when an error body carries nothing usable.
pub const UNKNOWN_ERROR: &str = "An unknown error occurred.";

/// Errors raised while decoding API payloads.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("expected {expected} in API response")]
    UnexpectedShape { expected: &'static str },
    #[error("malformed API response: {0}")]
    Json(#[from] serde_json::Error),
}

/// One entry of a create/update response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordResponse {
    #[serde(default)]
    pub identifier: Value,
    #[serde(default)]
    pub request_status: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl RecordResponse {
    /// True when the server reports the submission as a no-op.
    #[must_use]
    pub fn is_no_change(&self) -> bool {
        self.message
            .as_deref()
            .is_some_and(|m| m.contains(NO_CHANGES_MARKER))
    }

    /// The saved row as serialized by the server (`data.instance`).
    #[must_use]
    pub fn instance(&self) -> Option<&Record> {
        self.data.get("instance").and_then(Value::as_object)
    }

    /// Field-level change summary (`data.updates`), if any.
    #[must_use]
    pub fn updates(&self) -> Option<&Record> {
        self.data.get("updates").and_then(Value::as_object)
    }

    /// The envelope identifier as display text.
    #[must_use]
    pub fn identifier_text(&self) -> String {
        display_value(&self.identifier)
    }
}

/// Full create/update response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmitResponse(pub Vec<RecordResponse>);

impl SubmitResponse {
    /// Decodes a response body. A bare object is accepted as a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if the body is neither an array nor an
    /// object of response entries.
    pub fn from_value(body: Value) -> Result<Self, EnvelopeError> {
        match body {
            Value::Array(_) => Ok(serde_json::from_value(body)?),
            Value::Object(_) => Ok(Self(vec![serde_json::from_value(body)?])),
            _ => Err(EnvelopeError::UnexpectedShape {
                expected: "an array of record responses",
            }),
        }
    }

    /// The entry describing the submitted row.
    #[must_use]
    pub fn first(&self) -> Option<&RecordResponse> {
        self.0.first()
    }

    #[must_use]
    pub fn is_no_change(&self) -> bool {
        self.first().is_some_and(RecordResponse::is_no_change)
    }
}

/// Fetch-all payload: every collection keyed by table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllTables {
    pub tables: HashMap<TableKind, Vec<Record>>,
}

impl AllTables {
    /// Decodes the fetch-all body. Unknown keys are ignored and non-object
    /// rows are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::UnexpectedShape`] if the body is not an
    /// object, or a collection is not an array.
    pub fn from_value(body: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(map) = body else {
            return Err(EnvelopeError::UnexpectedShape {
                expected: "an object of table collections",
            });
        };
        let mut tables = HashMap::new();
        for (key, rows) in map {
            let Some(kind) = TableKind::resolve(&key) else {
                warn!(table = %key, "ignoring unknown collection in fetch-all payload");
                continue;
            };
            let Value::Array(rows) = rows else {
                return Err(EnvelopeError::UnexpectedShape {
                    expected: "an array per table collection",
                });
            };
            let records: Vec<Record> = rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(record) => Some(record),
                    other => {
                        warn!(table = %key, row = %other, "dropping non-object row");
                        None
                    }
                })
                .collect();
            tables.insert(kind, records);
        }
        Ok(Self { tables })
    }

    #[must_use]
    pub fn get(&self, kind: TableKind) -> Option<&Vec<Record>> {
        self.tables.get(&kind)
    }
}

/// Builds a user-facing message from an API error body.
///
/// Order of preference: a top-level `message` or `detail`; the
/// `field: error` pairs of the first entry's `data` list joined by `", "`;
/// the first entry's own `field`/`error`; the first entry as JSON; and
/// finally [`UNKNOWN_ERROR`].
#[must_use]
pub fn error_message(body: &Value) -> String {
    if let Some(text) = ["message", "detail"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
    {
        return text.to_string();
    }
    let Some(first) = body.as_array().and_then(|items| items.first()) else {
        return match body {
            Value::String(s) if !s.is_empty() => s.clone(),
            _ => UNKNOWN_ERROR.to_string(),
        };
    };
    if let Some(details) = first
        .get("data")
        .and_then(Value::as_array)
        .filter(|d| !d.is_empty())
    {
        return details
            .iter()
            .map(field_error_text)
            .collect::<Vec<_>>()
            .join(", ");
    }
    if let (Some(field), Some(err)) = (first.get("field"), first.get("error")) {
        return format!("{}: {}", display_value(field), display_value(err));
    }
    first.to_string()
}

fn field_error_text(detail: &Value) -> String {
    match (detail.get("field"), detail.get("error")) {
        (Some(field), Some(err)) => format!("{}: {}", display_value(field), display_value(err)),
        // Serializer errors arrive as `{"<field>": ["<error>", ...]}`.
        _ => match detail
            .as_object()
            .filter(|obj| obj.len() == 1)
            .and_then(|obj| obj.iter().next())
        {
            Some((field, errs)) => {
                let text = match errs {
                    Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(", "),
                    other => display_value(other),
                };
                format!("{field}: {text}")
            }
            None => detail.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_update_response() {
        let body = json!([{
            "identifier": "GSS123",
            "request_status": "UPDATED",
            "status_code": 200,
            "message": "participant GSS123 updated.",
            "data": {"updates": {"sex": "Male to Female"}, "instance": {"participant_id": "GSS123", "sex": "Female"}}
        }]);
        let resp = SubmitResponse::from_value(body).unwrap();
        let first = resp.first().unwrap();
        assert!(!resp.is_no_change());
        assert_eq!(first.identifier_text(), "GSS123");
        assert_eq!(first.instance().unwrap()["sex"], json!("Female"));
        assert_eq!(first.updates().unwrap()["sex"], json!("Male to Female"));
        assert_eq!(first.status_code, Some(200));
    }

    #[test]
    fn detects_no_change_message() {
        let body = json!([{
            "identifier": "GSS123",
            "request_status": "SUCCESS",
            "message": "participant GSS123 had no changes.",
            "data": {"updates": null, "instance": {"participant_id": "GSS123"}}
        }]);
        assert!(SubmitResponse::from_value(body).unwrap().is_no_change());
    }

    #[test]
    fn single_object_body_is_one_entry() {
        let resp = SubmitResponse::from_value(json!({"identifier": "F1", "message": "family F1 created."})).unwrap();
        assert_eq!(resp.0.len(), 1);
        assert!(resp.first().unwrap().instance().is_none());
    }

    #[test]
    fn scalar_body_is_rejected() {
        assert!(matches!(
            SubmitResponse::from_value(json!("ok")),
            Err(EnvelopeError::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn all_tables_keeps_known_collections() {
        let body = json!({
            "participants": [{"participant_id": "P1"}, {"participant_id": "P2"}],
            "families": [],
            "mystery": [{"x": 1}]
        });
        let all = AllTables::from_value(body).unwrap();
        assert_eq!(all.get(TableKind::Participants).unwrap().len(), 2);
        assert!(all.get(TableKind::Families).unwrap().is_empty());
        assert_eq!(all.tables.len(), 2);
    }

    #[test]
    fn all_tables_drops_non_object_rows() {
        let all = AllTables::from_value(json!({"analytes": [{"analyte_id": "A1"}, 7, null]})).unwrap();
        assert_eq!(all.get(TableKind::Analytes).unwrap().len(), 1);
    }

    #[test]
    fn all_tables_rejects_non_array_collection() {
        assert!(AllTables::from_value(json!({"participants": {"a": 1}})).is_err());
        assert!(AllTables::from_value(json!([1])).is_err());
    }

    #[test]
    fn error_message_prefers_top_level_text() {
        assert_eq!(error_message(&json!({"message": "boom"})), "boom");
        assert_eq!(
            error_message(&json!({"detail": "Given token not valid for any token type"})),
            "Given token not valid for any token type"
        );
    }

    #[test]
    fn error_message_joins_field_errors() {
        let body = json!([{
            "identifier": "GSS1",
            "request_status": "BAD REQUEST",
            "data": [
                {"field": "Sex", "error": "'X' is not one of ['Male', 'Female']"},
                {"field": "Age", "error": "-1 is less than the minimum of 0"}
            ]
        }]);
        assert_eq!(
            error_message(&body),
            "Sex: 'X' is not one of ['Male', 'Female'], Age: -1 is less than the minimum of 0"
        );
    }

    #[test]
    fn error_message_handles_serializer_errors() {
        let body = json!([{"data": [{"family_id": ["This field is required."]}]}]);
        assert_eq!(error_message(&body), "family_id: This field is required.");
    }

    #[test]
    fn error_message_uses_first_entry_field_pair() {
        let body = json!([{"field": "analyte_id", "error": "duplicate"}]);
        assert_eq!(error_message(&body), "analyte_id: duplicate");
    }

    #[test]
    fn error_message_falls_back_to_json_then_unknown() {
        assert_eq!(error_message(&json!([{"oops": 1}])), r#"{"oops":1}"#);
        assert_eq!(error_message(&json!(null)), UNKNOWN_ERROR);
        assert_eq!(error_message(&json!([])), UNKNOWN_ERROR);
    }
}
