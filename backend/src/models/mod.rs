//! Domain models for the Yardload import pipeline.
//!
//! This module contains the data structures that flow through one import:
//!
//! - [`FieldKind`] / [`FieldValue`] - semantic field types and typed values
//! - [`ImportRecord`] - one materialized row, fields in declaration order
//! - [`ValidationOutcome`] - pass, or every failing rule message
//! - [`ImportBatchResult`] - valid and invalid rows plus the uploaded headers
//! - [`DownstreamFailure`] - an insert rejected after validation

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::transform::FieldMapping;

// =============================================================================
// Field Kinds and Values
// =============================================================================

/// Semantic type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text, trimmed.
    Text,
    /// Whole number.
    Integer,
    /// Decimal number (`.` separator).
    Decimal,
    /// Calendar date.
    Date,
    /// Yes/no flag.
    Boolean,
    /// Enumeration-like code, stored uppercase.
    Code,
}

impl FieldKind {
    /// Lowercase name used in messages.
    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Decimal => "decimal",
            FieldKind::Date => "date",
            FieldKind::Boolean => "boolean",
            FieldKind::Code => "code",
        }
    }
}

/// A coerced, typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
    Boolean(bool),
    Code(String),
}

impl FieldValue {
    /// JSON representation sent downstream. Dates use `YYYY-MM-DD`.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) | FieldValue::Code(s) => json!(s),
            FieldValue::Integer(i) => json!(i),
            FieldValue::Decimal(d) => json!(d),
            FieldValue::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
            FieldValue::Boolean(b) => json!(b),
        }
    }

    /// Numeric view of integer and decimal values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// String view of text and code values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Code(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// True for text or code values that are empty after trimming.
    pub fn is_empty(&self) -> bool {
        self.as_str().is_some_and(|s| s.trim().is_empty())
    }
}

impl fmt::Display for FieldValue {
    /// Culture-invariant text form, re-importable by the materializer.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) | FieldValue::Code(s) => write!(f, "{}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Decimal(d) => write!(f, "{}", d),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

// =============================================================================
// Import Record
// =============================================================================

/// One materialized row.
///
/// Slots are created for every field of the schema in declaration order;
/// an unset slot means the cell was blank or absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    schema: String,
    slots: Vec<(String, Option<FieldValue>)>,
}

impl ImportRecord {
    /// Create an empty record with one slot per field name.
    pub fn new<I, S>(schema: impl Into<String>, field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: schema.into(),
            slots: field_names.into_iter().map(|n| (n.into(), None)).collect(),
        }
    }

    /// Name of the schema this record was built for.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.slots
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Set a field. Returns `false` if the record has no such field.
    pub fn set(&mut self, field: &str, value: FieldValue) -> bool {
        match self.slots.iter_mut().find(|(name, _)| name == field) {
            Some(slot) => {
                slot.1 = Some(value);
                true
            }
            None => false,
        }
    }

    /// Fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&FieldValue>)> {
        self.slots.iter().map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    /// JSON object with every field; unset fields are `null`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (name, value) in &self.slots {
            obj.insert(
                name.clone(),
                value.as_ref().map(FieldValue::to_json).unwrap_or(Value::Null),
            );
        }
        Value::Object(obj)
    }

    /// Deserialize the record into a caller-defined struct.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }
}

impl Serialize for ImportRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// =============================================================================
// Validation Outcome
// =============================================================================

/// Result of validating one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Pass,
    /// Every failing rule message, in rule-declaration order. Never empty.
    Fail(Vec<String>),
}

impl ValidationOutcome {
    /// `Pass` when `errors` is empty, `Fail` otherwise.
    pub fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            ValidationOutcome::Pass
        } else {
            ValidationOutcome::Fail(errors)
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, ValidationOutcome::Pass)
    }

    pub fn errors(&self) -> &[String] {
        match self {
            ValidationOutcome::Pass => &[],
            ValidationOutcome::Fail(errors) => errors,
        }
    }
}

// =============================================================================
// Batch Result
// =============================================================================

/// A row that materialized and passed validation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidRow {
    /// 1-based sheet row (the header is row 1).
    pub row_number: usize,
    pub record: ImportRecord,
    /// Raw display text of every uploaded cell.
    #[serde(skip)]
    pub cells: Vec<String>,
}

/// A row that needs correction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidRow {
    /// 1-based sheet row (the header is row 1).
    pub row_number: usize,
    /// `None` when the row failed to materialize.
    pub record: Option<ImportRecord>,
    /// Raw display text of every uploaded cell.
    #[serde(skip)]
    pub cells: Vec<String>,
    /// Materialization or validation messages first, downstream ones after.
    pub errors: Vec<String>,
}

/// An insert rejected by the downstream collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamFailure {
    pub row_number: usize,
    pub message: String,
}

/// Everything one upload produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatchResult {
    pub schema: String,
    /// Uploaded header row, in file order.
    pub headers: Vec<String>,
    /// Column-to-field mapping the rows were materialized with.
    #[serde(skip)]
    pub mapping: FieldMapping,
    pub valid: Vec<ValidRow>,
    pub invalid: Vec<InvalidRow>,
    /// Rows skipped because every cell was blank.
    pub skipped_blank: usize,
}

impl ImportBatchResult {
    pub fn new(schema: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            schema: schema.into(),
            headers,
            mapping: FieldMapping::default(),
            valid: Vec::new(),
            invalid: Vec::new(),
            skipped_blank: 0,
        }
    }

    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn valid_count(&self) -> usize {
        self.valid.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid.len()
    }

    /// True when no row needs correction.
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }

    /// Fold downstream rejections into the invalid set.
    ///
    /// A failure naming a valid row moves that row to the invalid set; a
    /// failure naming an already-invalid row appends its message. Failures
    /// naming unknown rows are ignored. Returns how many were applied.
    pub fn merge_downstream(&mut self, failures: Vec<DownstreamFailure>) -> usize {
        let mut applied = 0;

        for failure in failures {
            if let Some(pos) = self.valid.iter().position(|r| r.row_number == failure.row_number) {
                let row = self.valid.remove(pos);
                self.invalid.push(InvalidRow {
                    row_number: row.row_number,
                    record: Some(row.record),
                    cells: row.cells,
                    errors: vec![failure.message],
                });
                applied += 1;
            } else if let Some(row) = self
                .invalid
                .iter_mut()
                .find(|r| r.row_number == failure.row_number)
            {
                row.errors.push(failure.message);
                applied += 1;
            }
        }

        self.invalid.sort_by_key(|r| r.row_number);
        applied
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ImportRecord {
        let mut record = ImportRecord::new("vehicle", ["vin", "yard_id", "arrival_date", "damaged"]);
        record.set("vin", FieldValue::Text("WVWZZZ1JZXW000001".into()));
        record.set("yard_id", FieldValue::Integer(4));
        record.set(
            "arrival_date",
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
        );
        record
    }

    fn valid_row(row_number: usize) -> ValidRow {
        ValidRow { row_number, record: record(), cells: vec![] }
    }

    #[test]
    fn test_record_set_and_get() {
        let mut record = record();
        assert_eq!(record.get("yard_id"), Some(&FieldValue::Integer(4)));
        assert_eq!(record.get("damaged"), None);
        assert!(!record.set("colour", FieldValue::Text("red".into())));
        assert!(record.set("damaged", FieldValue::Boolean(true)));
        assert_eq!(record.get("damaged"), Some(&FieldValue::Boolean(true)));
    }

    #[test]
    fn test_record_to_json_keeps_unset_fields() {
        let json = record().to_json();
        assert_eq!(json["vin"], "WVWZZZ1JZXW000001");
        assert_eq!(json["yard_id"], 4);
        assert_eq!(json["arrival_date"], "2024-03-09");
        assert!(json["damaged"].is_null());
    }

    #[test]
    fn test_record_to_typed() {
        #[derive(Deserialize)]
        struct Vehicle {
            vin: String,
            yard_id: i64,
            arrival_date: NaiveDate,
            damaged: Option<bool>,
        }

        let vehicle: Vehicle = record().to_typed().unwrap();
        assert_eq!(vehicle.vin, "WVWZZZ1JZXW000001");
        assert_eq!(vehicle.yard_id, 4);
        assert_eq!(vehicle.arrival_date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(vehicle.damaged, None);
    }

    #[test]
    fn test_field_value_display_is_invariant() {
        assert_eq!(FieldValue::Decimal(1250.5).to_string(), "1250.5");
        assert_eq!(FieldValue::Decimal(3.0).to_string(), "3");
        assert_eq!(FieldValue::Boolean(false).to_string(), "false");
        assert_eq!(
            FieldValue::Date(NaiveDate::from_ymd_opt(2023, 12, 1).unwrap()).to_string(),
            "2023-12-01"
        );
    }

    #[test]
    fn test_validation_outcome_from_errors() {
        assert!(ValidationOutcome::from_errors(vec![]).is_pass());
        let outcome = ValidationOutcome::from_errors(vec!["bad".into()]);
        assert!(!outcome.is_pass());
        assert_eq!(outcome.errors(), ["bad".to_string()]);
    }

    #[test]
    fn test_merge_downstream_moves_valid_rows() {
        let mut batch = ImportBatchResult::new("vehicle", vec!["Vin".into()]);
        batch.valid = vec![valid_row(2), valid_row(3), valid_row(5)];
        batch.invalid.push(InvalidRow {
            row_number: 4,
            record: None,
            cells: vec![],
            errors: vec!["invalid integer value `x` for field `Yard Id`".into()],
        });

        let applied = batch.merge_downstream(vec![
            DownstreamFailure { row_number: 5, message: "duplicate VIN".into() },
            DownstreamFailure { row_number: 4, message: "yard closed".into() },
            DownstreamFailure { row_number: 99, message: "ignored".into() },
        ]);

        assert_eq!(applied, 2);
        assert_eq!(batch.valid_count(), 2);
        let rows: Vec<usize> = batch.invalid.iter().map(|r| r.row_number).collect();
        assert_eq!(rows, vec![4, 5]);
        assert_eq!(batch.invalid[0].errors.len(), 2);
        assert_eq!(batch.invalid[0].errors[1], "yard closed");
        assert!(batch.invalid[1].record.is_some());
    }
}
