//! Export of the filtered row set.
//!
//! Delimited output has a header row of column titles followed by one line
//! per row, joined with `\n`. A field is wrapped in double quotes, with
//! embedded quotes doubled, when it contains the delimiter, a quote, a CR or
//! a newline. JSON output is a pretty-printed array of the rows restricted to
//! the exported columns.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::grid::Column;
use crate::types::{cell_text, Record};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No data to export.")]
    NoData,
    #[error("failed to encode export: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Tsv,
    Csv,
    Json,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Tsv => "tsv",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Tsv => "text/tab-separated-values;charset=utf-8",
            Self::Csv => "text/csv;charset=utf-8",
            Self::Json => "application/json",
        }
    }

    /// Field separator for delimited formats.
    #[must_use]
    pub fn delimiter(self) -> Option<char> {
        match self {
            Self::Tsv => Some('\t'),
            Self::Csv => Some(','),
            Self::Json => None,
        }
    }

    /// File name used when the caller does not pick one.
    #[must_use]
    pub fn default_filename(self) -> String {
        format!("table_data.{}", self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown export format {0:?}; expected tsv, csv or json")]
pub struct ExportFormatError(pub String);

impl FromStr for ExportFormat {
    type Err = ExportFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tsv" => Ok(Self::Tsv),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(ExportFormatError(s.to_string())),
        }
    }
}

/// Quotes `field` if it contains `delimiter`, `"`, `\r` or `\n`.
#[must_use]
pub fn escape_field(field: &str, delimiter: char) -> Cow<'_, str> {
    if field.contains([delimiter, '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Renders `rows` over `columns` in `format`.
///
/// # Errors
///
/// Returns [`ExportError::NoData`] when there are no rows or no columns, and
/// [`ExportError::Json`] if JSON encoding fails.
pub fn export_rows(
    columns: &[&Column],
    rows: &[&Record],
    format: ExportFormat,
) -> Result<String, ExportError> {
    if rows.is_empty() || columns.is_empty() {
        return Err(ExportError::NoData);
    }
    match format.delimiter() {
        Some(delimiter) => Ok(delimited(columns, rows, delimiter)),
        None => json(columns, rows),
    }
}

fn delimited(columns: &[&Column], rows: &[&Record], delimiter: char) -> String {
    let sep = delimiter.to_string();
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        columns
            .iter()
            .map(|c| escape_field(&c.title, delimiter))
            .collect::<Vec<_>>()
            .join(&sep),
    );
    for row in rows {
        lines.push(
            columns
                .iter()
                .map(|c| escape_field(&cell_text(row, &c.key), delimiter).into_owned())
                .collect::<Vec<_>>()
                .join(&sep),
        );
    }
    lines.join("\n")
}

fn json(columns: &[&Column], rows: &[&Record]) -> Result<String, ExportError> {
    let projected: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut out = Record::new();
            for column in columns {
                out.insert(
                    column.key.clone(),
                    row.get(&column.key).cloned().unwrap_or(Value::Null),
                );
            }
            Value::Object(out)
        })
        .collect();
    Ok(serde_json::to_string_pretty(&projected)?)
}
