use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat row as returned by the API: field name to scalar or array-of-string.
///
/// Backed by an insertion-ordered JSON object so that rows keep the field
/// order the server sent them in.
pub type Record = Map<String, Value>;

/// Lifecycle of a fetch or submit operation against the client store.
///
/// State machine: `Idle -> Loading -> {Fulfilled | Rejected}`. A later
/// operation moves the store back to `Loading` from either terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    /// No operation has been issued yet.
    #[default]
    Idle,
    /// An operation is in flight.
    Loading,
    /// The last operation completed successfully (including "no changes").
    Fulfilled,
    /// The last operation failed.
    Rejected,
}

impl LoadStatus {
    /// Returns the lowercase wire name of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
        }
    }
}

/// Whether a submission creates a new row or edits an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    Create,
    Update,
}

impl SubmitMode {
    /// Past-tense verb used in user-facing notices.
    #[must_use]
    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
        }
    }
}

/// Renders a cell value the way the table and export layers display it.
///
/// Strings are emitted verbatim, arrays are joined with `|`, null becomes the
/// empty string and other scalars use their JSON text.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join("|"),
        other => other.to_string(),
    }
}

/// Looks up `field` in `record` and renders it with [`display_value`].
/// Absent fields render as the empty string.
#[must_use]
pub fn cell_text(record: &Record, field: &str) -> String {
    record.get(field).map(display_value).unwrap_or_default()
}
