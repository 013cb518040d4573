//! Spreadsheet (xlsx, xlsm, xlsb, xls, ods) to raw cells.
//!
//! Reads the first worksheet's used range. Formula cells carry the value
//! the spreadsheet application last calculated, wrapped as
//! [`Cell::Formula`]; a formula whose last result is an error stays a
//! [`Cell::Error`].

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::NaiveDateTime;
use std::io::Cursor;

use crate::error::{ReadError, ReadResult};

use super::Cell;

/// Parse workbook bytes into rows of cells, header row first.
pub fn parse_workbook(bytes: &[u8]) -> ReadResult<Vec<Vec<Cell>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ReadError::Workbook(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ReadError::Workbook("workbook has no worksheet".to_string()))?;

    let values = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ReadError::Workbook(e.to_string()))?;

    // Formula extraction is best effort; some formats do not expose it.
    let formulas = workbook.worksheet_formula(&sheet_name).ok();

    Ok(range_to_rows(&values, formulas.as_ref()))
}

/// Convert a value range (and optional formula range) into cell rows.
pub fn range_to_rows(values: &Range<Data>, formulas: Option<&Range<String>>) -> Vec<Vec<Cell>> {
    let (start_row, start_col) = values.start().unwrap_or((0, 0));

    values
        .rows()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(|(c, data)| {
                    let position = (start_row + r as u32, start_col + c as u32);
                    let is_formula = formulas
                        .and_then(|f| f.get_value(position))
                        .is_some_and(|f| !f.is_empty());

                    let cell = data_to_cell(data);
                    // An error result stays an error whether or not a formula produced it.
                    if is_formula && !matches!(cell, Cell::Error(_) | Cell::Unknown) {
                        Cell::Formula(cell.display())
                    } else {
                        cell
                    }
                })
                .collect()
        })
        .collect()
}

/// Map one calamine value onto a raw cell kind.
pub fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Blank,
        Data::String(s) => Cell::from_text(s),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Boolean(*b),
        Data::DateTime(dt) => dt.as_datetime().map(Cell::Date).unwrap_or(Cell::Unknown),
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::from_text(s)),
        Data::Error(e) => Cell::Error(e.to_string()),
        Data::DurationIso(_) => Cell::Unknown,
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
