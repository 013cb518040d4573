//! Header-to-field mapping.
//!
//! Builds the [`FieldMapping`] for one upload from its header row. Two modes:
//!
//! - [`MatchMode::Positional`] (default): column *i* feeds field *i*, in
//!   declaration order, up to the shorter of the two lists.
//! - [`MatchMode::ByHeader`]: a column feeds the field whose name, label or
//!   alias normalizes to the same string as the column header.
//!
//! Columns that match nothing are ignored. The reserved `ErrorMessages`
//! column written by the invalid-rows export is never mapped, so a
//! corrected export can be uploaded again unchanged.

use serde::{Deserialize, Serialize};

use crate::export::ERROR_COLUMN;
use crate::schema::RecordSchema;

/// Separator that runs of spaces, hyphens and underscores collapse into.
const SEPARATOR: char = '_';

/// Normalize a header for case- and format-insensitive comparison.
///
/// Lowercases, trims, and collapses every run of spaces, hyphens and
/// underscores into a single `_`. Leading and trailing separators are
/// dropped. Idempotent.
///
/// ```
/// use yardload::normalize_header;
///
/// assert_eq!(normalize_header("First-Name"), normalize_header("first name"));
/// assert_eq!(normalize_header("  Arrival  Date "), "arrival_date");
/// ```
pub fn normalize_header(header: &str) -> String {
    let mut normalized = String::with_capacity(header.len());
    let mut pending_separator = false;

    for c in header.trim().chars() {
        if c.is_whitespace() || c == '-' || c == SEPARATOR {
            pending_separator = true;
            continue;
        }
        if pending_separator && !normalized.is_empty() {
            normalized.push(SEPARATOR);
        }
        pending_separator = false;
        normalized.extend(c.to_lowercase());
    }

    normalized
}

/// How uploaded columns are matched to record fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Column order equals field declaration order.
    #[default]
    Positional,
    /// Columns are matched by normalized header name.
    ByHeader,
}

impl MatchMode {
    /// Parse `header`/`name` or `position`/`positional`.
    pub fn parse(value: &str) -> Option<Self> {
        match normalize_header(value).as_str() {
            "header" | "headers" | "by_header" | "name" => Some(MatchMode::ByHeader),
            "position" | "positional" | "index" => Some(MatchMode::Positional),
            _ => None,
        }
    }
}

/// Column position to field name, built once per batch.
///
/// Each field is fed by at most one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    entries: Vec<(usize, String)>,
}

impl FieldMapping {
    /// Mapped `(column, field)` pairs in column order.
    pub fn entries(&self) -> &[(usize, String)] {
        &self.entries
    }

    /// Field fed by a column, if any.
    pub fn field_for_column(&self, column: usize) -> Option<&str> {
        self.entries
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, f)| f.as_str())
    }

    /// Column feeding a field, if any.
    pub fn column_for_field(&self, field: &str) -> Option<usize> {
        self.entries.iter().find(|(_, f)| f == field).map(|(c, _)| *c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, column: usize, field: &str) -> bool {
        if self.column_for_field(field).is_some() {
            return false;
        }
        self.entries.push((column, field.to_string()));
        true
    }
}

/// Build the mapping for one upload.
pub fn build_mapping(headers: &[String], schema: &RecordSchema, mode: MatchMode) -> FieldMapping {
    let reserved = normalize_header(ERROR_COLUMN);
    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (i, normalize_header(h)))
        .filter(|(_, h)| *h != reserved)
        .collect();

    let mut mapping = FieldMapping::default();

    match mode {
        MatchMode::Positional => {
            for ((column, _), field) in columns.iter().zip(schema.fields()) {
                mapping.push(*column, &field.name);
            }
        }
        MatchMode::ByHeader => {
            for (column, header) in &columns {
                if let Some(field) = schema.fields().iter().find(|f| f.matches_header(header)) {
                    // First column wins when a header repeats.
                    mapping.push(*column, &field.name);
                }
            }
        }
    }

    mapping
}

/// Required fields no column feeds.
pub fn unmapped_required<'a>(mapping: &FieldMapping, schema: &'a RecordSchema) -> Vec<&'a str> {
    schema
        .fields()
        .iter()
        .filter(|f| f.required && mapping.column_for_field(&f.name).is_none())
        .map(|f| f.label())
        .collect()
}
