//! Delimited text (CSV, semicolon, tab, pipe) to raw cells.

use crate::error::{ReadError, ReadResult};

use super::Cell;

/// Parse decoded text into rows of cells.
///
/// Quoted fields, embedded delimiters and ragged rows are handled by the
/// `csv` reader. The header row is returned as the first row.
pub fn parse_delimited(content: &str, delimiter: char) -> ReadResult<Vec<Vec<Cell>>> {
    if !delimiter.is_ascii() {
        return Err(ReadError::Csv(format!(
            "delimiter '{}' is not a single-byte character",
            delimiter
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ReadError::Csv(e.to_string()))?;
        rows.push(record.iter().map(Cell::from_text).collect());
    }

    Ok(rows)
}
