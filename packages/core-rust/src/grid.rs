//! Schema-driven table views over cached collections.
//!
//! A [`TableView`] turns a [`Schema`] into columns and applies, in order:
//! global search, advanced filters, sorting and pagination. Everything is
//! recomputed synchronously from the rows it is handed; the view never owns
//! data.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use regex::RegexBuilder;
use serde_json::Value;

use crate::schema::Schema;
use crate::types::{cell_text, display_value, Record};

/// Text shown for an empty cell.
pub const EMPTY_CELL: &str = "-";

/// Reported when a regex search pattern does not compile.
pub const INVALID_REGEX: &str = "Invalid regular expression";

/// Fixed page sizes offered by the pager; [`PageSize::All`] is also allowed.
pub const PAGE_SIZES: [usize; 4] = [10, 25, 50, 100];

// ---- Columns ----

/// One rendered column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Record key the column reads.
    pub key: String,
    /// Header text: `label`, then `title`, then the key.
    pub title: String,
}

/// Builds one column per schema property, in declaration order.
#[must_use]
pub fn columns_for(schema: &Schema) -> Vec<Column> {
    schema
        .fields()
        .into_iter()
        .map(|field| Column {
            key: field.name,
            title: field.label,
        })
        .collect()
}

/// User-toggled set of hidden columns. Everything is visible by default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnVisibility {
    hidden: HashSet<String>,
}

impl ColumnVisibility {
    #[must_use]
    pub fn is_visible(&self, key: &str) -> bool {
        !self.hidden.contains(key)
    }

    /// Flips one column and returns its new visibility.
    pub fn toggle(&mut self, key: &str) -> bool {
        if self.hidden.remove(key) {
            true
        } else {
            self.hidden.insert(key.to_string());
            false
        }
    }

    pub fn hide(&mut self, key: impl Into<String>) {
        self.hidden.insert(key.into());
    }

    pub fn show(&mut self, key: &str) {
        self.hidden.remove(key);
    }
}

// ---- Comparator ----

/// Orders two cell values.
///
/// Both sides are rendered to text (absent and null become `""`). Empty cells
/// sort first, then cells that parse as numbers (compared numerically), then
/// everything else in [`natural_cmp`] order. Keeping the groups apart makes
/// this a total order, as `sort_by` requires.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.map(display_value).unwrap_or_default();
    let b = b.map(display_value).unwrap_or_default();
    let (x, y) = (CellKey::of(&a), CellKey::of(&b));
    x.rank()
        .cmp(&y.rank())
        .then_with(|| match (x, y) {
            (CellKey::Number(m), CellKey::Number(n)) => m.total_cmp(&n),
            _ => Ordering::Equal,
        })
        .then_with(|| natural_cmp(&a, &b))
}

#[derive(Clone, Copy)]
enum CellKey {
    Empty,
    Number(f64),
    Text,
}

impl CellKey {
    fn of(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::Empty;
        }
        parse_number(text).map_or(Self::Text, Self::Number)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Number(_) => 1,
            Self::Text => 2,
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Case-insensitive string order that compares embedded digit runs by
/// numeric value, so `"a2" < "a10"`. Exact ties are broken by code point.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_chunk(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_chunk(x: &str, y: &str) -> Ordering {
    let x_digits = x.starts_with(|c: char| c.is_ascii_digit());
    let y_digits = y.starts_with(|c: char| c.is_ascii_digit());
    if x_digits && y_digits {
        let xs = x.trim_start_matches('0');
        let ys = y.trim_start_matches('0');
        return xs.len().cmp(&ys.len()).then_with(|| xs.cmp(ys));
    }
    x.chars()
        .flat_map(char::to_lowercase)
        .cmp(y.chars().flat_map(char::to_lowercase))
}

/// Splits text into alternating runs of ASCII digits and everything else.
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

// ---- Query state ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

/// Rows per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Rows(usize),
    All,
}

impl Default for PageSize {
    fn default() -> Self {
        Self::Rows(PAGE_SIZES[0])
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows(n) => write!(f, "{n}"),
            Self::All => f.write_str("All"),
        }
    }
}

/// Error for a page size outside [`PAGE_SIZES`] and `All`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported page size {0:?}; expected one of 10, 25, 50, 100, All")]
pub struct PageSizeError(pub String);

impl FromStr for PageSize {
    type Err = PageSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        match s.trim().parse::<usize>() {
            Ok(n) if PAGE_SIZES.contains(&n) => Ok(Self::Rows(n)),
            _ => Err(PageSizeError(s.to_string())),
        }
    }
}

/// Global search box contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Search {
    pub text: String,
    /// Treat `text` as a case-insensitive regular expression.
    pub regex: bool,
}

impl Search {
    #[must_use]
    pub fn substring(text: impl Into<String>) -> Self {
        Self { text: text.into(), regex: false }
    }

    #[must_use]
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self { text: pattern.into(), regex: true }
    }
}

/// Field name to substring pattern. All non-empty patterns must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvancedFilters(IndexMap<String, String>);

impl AdvancedFilters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, pattern: impl Into<String>) {
        self.0.insert(field.into(), pattern.into());
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(String::is_empty)
    }

    #[must_use]
    pub fn matches(&self, row: &Record) -> bool {
        self.0.iter().all(|(field, pattern)| {
            pattern.is_empty()
                || cell_text(row, field)
                    .to_lowercase()
                    .contains(&pattern.to_lowercase())
        })
    }
}

/// Everything the operator has set on a table view.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub search: Search,
    pub filters: AdvancedFilters,
    pub sort: Option<SortSpec>,
    /// 1-based page number.
    pub page: usize,
    pub page_size: PageSize,
    pub visibility: ColumnVisibility,
}

// ---- View ----

/// Rows surviving search and filters, before sorting and paging.
#[derive(Debug, Clone)]
pub struct Filtered<'a> {
    pub rows: Vec<&'a Record>,
    /// Set when a regex search failed to compile; `rows` is then empty.
    pub search_error: Option<String>,
}

/// One rendered page.
#[derive(Debug, Clone)]
pub struct ViewPage<'a> {
    pub columns: Vec<&'a Column>,
    pub rows: Vec<&'a Record>,
    /// Row count after filtering, across all pages.
    pub total: usize,
    /// 1-based page actually shown, clamped to `1..=page_count`.
    pub page: usize,
    pub page_count: usize,
    pub search_error: Option<String>,
}

impl ViewPage<'_> {
    /// Cell text for display, with `-` for empty cells.
    #[must_use]
    pub fn cells(&self, row: &Record) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| render_cell(row, &column.key))
            .collect()
    }
}

/// Display text of one cell: the value, or `-` when it is empty.
#[must_use]
pub fn render_cell(row: &Record, key: &str) -> String {
    let text = cell_text(row, key);
    if text.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        text
    }
}

/// A table view bound to one schema.
#[derive(Debug, Clone)]
pub struct TableView {
    columns: Vec<Column>,
    pub state: ViewState,
}

impl TableView {
    #[must_use]
    pub fn new(schema: &Schema) -> Self {
        Self {
            columns: columns_for(schema),
            state: ViewState {
                page: 1,
                ..ViewState::default()
            },
        }
    }

    /// All schema columns, visible or not.
    #[must_use]
    pub fn all_columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn visible_columns(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|c| self.state.visibility.is_visible(&c.key))
            .collect()
    }

    /// Applies global search then advanced filters.
    #[must_use]
    pub fn filter<'a>(&self, rows: &'a [Record]) -> Filtered<'a> {
        let search = &self.state.search;
        let mut out: Vec<&Record> = if search.text.trim().is_empty() {
            rows.iter().collect()
        } else if search.regex {
            match RegexBuilder::new(search.text.trim())
                .case_insensitive(true)
                .build()
            {
                Ok(re) => rows
                    .iter()
                    .filter(|row| row.values().any(|v| re.is_match(&display_value(v))))
                    .collect(),
                Err(_) => {
                    return Filtered {
                        rows: Vec::new(),
                        search_error: Some(INVALID_REGEX.to_string()),
                    }
                }
            }
        } else {
            let needle = search.text.to_lowercase();
            rows.iter()
                .filter(|row| {
                    row.values()
                        .any(|v| display_value(v).to_lowercase().contains(&needle))
                })
                .collect()
        };
        if !self.state.filters.is_empty() {
            out.retain(|row| self.state.filters.matches(row));
        }
        Filtered {
            rows: out,
            search_error: None,
        }
    }

    /// Stable sort by the current [`SortSpec`], if any.
    pub fn sort(&self, rows: &mut [&Record]) {
        let Some(spec) = &self.state.sort else {
            return;
        };
        rows.sort_by(|a, b| {
            let ord = compare_values(a.get(&spec.column), b.get(&spec.column));
            match spec.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
    }

    /// Filters, sorts and pages `rows`.
    #[must_use]
    pub fn render<'a>(&'a self, rows: &'a [Record]) -> ViewPage<'a> {
        let Filtered { rows: mut matched, search_error } = self.filter(rows);
        self.sort(&mut matched);

        let total = matched.len();
        let size = match self.state.page_size {
            PageSize::Rows(n) => n.max(1),
            PageSize::All => total.max(1),
        };
        let page_count = total.div_ceil(size).max(1);
        let page = self.state.page.clamp(1, page_count);
        let start = (page - 1) * size;
        let shown = matched.into_iter().skip(start).take(size).collect();

        ViewPage {
            columns: self.visible_columns(),
            rows: shown,
            total,
            page,
            page_count,
            search_error,
        }
    }
}
