//! Row materialization: raw cells to a typed [`ImportRecord`].
//!
//! Coercion is culture-invariant: `.` is the decimal separator, no digit
//! grouping, dates are ISO (`YYYY-MM-DD`, `YYYY/MM/DD`, date-time) or
//! `MM/DD/YYYY`. Numeric cells feed date fields as spreadsheet serial
//! numbers. Error cells and unknown cell kinds coerce to absent.
//!
//! A failing cell never aborts anything: every problem in the row is
//! collected and returned as the row's failure.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::{FieldKind, FieldValue, ImportRecord};
use crate::parser::{format_number, Cell};
use crate::schema::{FieldDescriptor, RecordSchema};
use crate::validation::missing_required_message;

use super::mapper::FieldMapping;

const TRUE_VALUES: [&str; 4] = ["true", "yes", "y", "1"];
const FALSE_VALUES: [&str; 4] = ["false", "no", "n", "0"];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Why a row could not be materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializeFailure {
    /// Every problem found, in column order.
    pub messages: Vec<String>,
    /// Fields that did coerce, for best-effort export.
    pub partial: ImportRecord,
}

/// Build a record from one row.
pub fn materialize(
    row: &[Cell],
    mapping: &FieldMapping,
    schema: &RecordSchema,
) -> Result<ImportRecord, MaterializeFailure> {
    let mut record = schema.new_record();
    let mut messages = Vec::new();

    // Column order, unmapped fields last.
    let mut fields: Vec<(Option<usize>, &FieldDescriptor)> = schema
        .fields()
        .iter()
        .map(|f| (mapping.column_for_field(&f.name), f))
        .collect();
    fields.sort_by_key(|(column, _)| column.unwrap_or(usize::MAX));

    for (column, field) in fields {
        let cell = column.and_then(|c| row.get(c)).unwrap_or(&Cell::Blank);

        match coerce(cell, field) {
            Ok(Some(value)) => {
                record.set(&field.name, value);
            }
            Ok(None) if field.required => messages.push(missing_required_message(field.label())),
            Ok(None) => {}
            Err(message) => messages.push(message),
        }
    }

    if messages.is_empty() {
        Ok(record)
    } else {
        Err(MaterializeFailure {
            messages,
            partial: record,
        })
    }
}

/// Coerce one cell for one field.
///
/// `Ok(None)` means absent (blank, error or unknown cell).
pub fn coerce(cell: &Cell, field: &FieldDescriptor) -> Result<Option<FieldValue>, String> {
    let cell = match cell {
        Cell::Formula(display) => Cell::from_text(display),
        Cell::Error(_) | Cell::Unknown => return Ok(None),
        other => other.clone(),
    };
    if cell.is_blank() {
        return Ok(None);
    }

    let value = match (field.kind, &cell) {
        (FieldKind::Text, c) => Some(FieldValue::Text(c.display())),
        (FieldKind::Code, c) => Some(FieldValue::Code(c.display().to_uppercase())),

        (FieldKind::Integer, Cell::Number(n)) => whole_number(*n).map(FieldValue::Integer),
        (FieldKind::Integer, Cell::Text(s)) => parse_integer(s).map(FieldValue::Integer),

        (FieldKind::Decimal, Cell::Number(n)) => Some(FieldValue::Decimal(*n)),
        (FieldKind::Decimal, Cell::Text(s)) => parse_decimal(s).map(FieldValue::Decimal),

        (FieldKind::Boolean, Cell::Boolean(b)) => Some(FieldValue::Boolean(*b)),
        (FieldKind::Boolean, Cell::Number(n)) => parse_boolean(&format_number(*n)).map(FieldValue::Boolean),
        (FieldKind::Boolean, Cell::Text(s)) => parse_boolean(s).map(FieldValue::Boolean),

        (FieldKind::Date, Cell::Date(dt)) => Some(FieldValue::Date(dt.date())),
        (FieldKind::Date, Cell::Number(n)) => serial_to_date(*n).map(FieldValue::Date),
        (FieldKind::Date, Cell::Text(s)) => parse_date(s).map(FieldValue::Date),

        _ => None,
    };

    value.map(Some).ok_or_else(|| {
        format!(
            "invalid {} value `{}` for field `{}`",
            field.kind.describe(),
            cell.display(),
            field.label()
        )
    })
}

fn whole_number(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n.abs() < 9.0e15).then_some(n as i64)
}

/// Integer text; a zero fraction such as `12.0` is accepted.
pub fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| parse_decimal(s).and_then(whole_number))
}

/// Finite decimal text with `.` separator.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')) {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn parse_boolean(s: &str) -> Option<bool> {
    let lower = s.trim().to_lowercase();
    if TRUE_VALUES.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_VALUES.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
}

/// Spreadsheet serial day number (1900 date system) to a date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}
