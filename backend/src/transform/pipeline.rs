//! Batch orchestration: sheet in, [`ImportBatchResult`] out.
//!
//! This module drives every row of an upload through the pipeline:
//! mapping, materialization, validation and routing into the valid or
//! invalid set.
//!
//! # Example
//!
//! ```rust,ignore
//! use yardload::{import_file, ImportOptions, SchemaRegistry};
//!
//! let schema = SchemaRegistry::builtin().require("vehicle")?;
//! let run = import_file("arrivals.xlsx", &schema, &ImportOptions::default())?;
//! println!("{} valid, {} invalid", run.batch.valid_count(), run.batch.invalid_count());
//! ```

use serde::Serialize;
use std::path::Path;

use crate::api::logs::{log_error, log_error_indent, log_info, log_info_indent, log_success, log_warning};
use crate::error::{ImportResult, ReadError};
use crate::models::{ImportBatchResult, InvalidRow, ValidRow, ValidationOutcome};
use crate::parser::{read_bytes, read_file, Cell, ReadOptions, Sheet, SourceFormat};
use crate::schema::RecordSchema;

use super::mapper::{build_mapping, unmapped_required, MatchMode};
use super::materializer::materialize;

/// Options for one import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOptions {
    /// How columns are matched to fields.
    pub match_mode: MatchMode,
    /// Force a delimiter for text uploads.
    pub delimiter: Option<char>,
}

/// What the reader detected about the upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub format: SourceFormat,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    /// Data rows read, blank ones included.
    pub row_count: usize,
}

/// Result of a complete import run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    pub batch: ImportBatchResult,
    pub source: SourceInfo,
}

/// Import a file from disk.
pub fn import_file<P: AsRef<Path>>(
    path: P,
    schema: &RecordSchema,
    options: &ImportOptions,
) -> ImportResult<ImportRun> {
    let sheet = read_file(path, &read_options(options))?;
    run_sheet(sheet, schema, options)
}

/// Import uploaded bytes. `file_name` helps format detection.
pub fn import_bytes(
    bytes: &[u8],
    file_name: Option<&str>,
    schema: &RecordSchema,
    options: &ImportOptions,
) -> ImportResult<ImportRun> {
    let sheet = read_bytes(bytes, file_name, &read_options(options))?;
    run_sheet(sheet, schema, options)
}

fn read_options(options: &ImportOptions) -> ReadOptions {
    ReadOptions {
        delimiter: options.delimiter,
    }
}

fn run_sheet(sheet: Sheet, schema: &RecordSchema, options: &ImportOptions) -> ImportResult<ImportRun> {
    log_info("📖 Reading upload...");
    match sheet.format {
        SourceFormat::Workbook => log_success("Detected spreadsheet"),
        SourceFormat::Delimited => {
            log_success(format!(
                "Detected encoding: {}",
                sheet.encoding.as_deref().unwrap_or("utf-8")
            ));
            log_success(format!(
                "Detected separator: '{}'",
                format_delimiter(sheet.delimiter.unwrap_or(','))
            ));
        }
    }
    log_success(format!("Read {} rows", sheet.rows.len()));

    let source = SourceInfo {
        format: sheet.format,
        encoding: sheet.encoding.clone(),
        delimiter: sheet.delimiter,
        row_count: sheet.rows.len(),
    };

    let batch = import_sheet(&sheet, schema, options)?;
    Ok(ImportRun { batch, source })
}

/// Drive every row of a parsed sheet through the pipeline.
///
/// Blank rows are skipped. A row that fails to materialize is recorded
/// invalid without being validated. Only an empty sheet is an error.
pub fn import_sheet(
    sheet: &Sheet,
    schema: &RecordSchema,
    options: &ImportOptions,
) -> ImportResult<ImportBatchResult> {
    let mapping = build_mapping(&sheet.headers, schema, options.match_mode);

    log_info(format!(
        "🗺️  Mapping {} columns onto '{}' ({:?})",
        sheet.headers.len(),
        schema.name(),
        options.match_mode
    ));
    for (column, field) in mapping.entries() {
        log_info_indent(format!("{} → {}", sheet.headers[*column], schema.label_of(field)), 1);
    }
    let missing = unmapped_required(&mapping, schema);
    if !missing.is_empty() {
        log_warning(format!("No column for required field(s): {}", missing.join(", ")));
    }

    let mut batch = ImportBatchResult::new(schema.name(), sheet.headers.clone())
        .with_mapping(mapping.clone());

    for (index, row) in sheet.rows.iter().enumerate() {
        // Header is row 1.
        let row_number = index + 2;

        if row.iter().all(Cell::is_blank) {
            batch.skipped_blank += 1;
            continue;
        }

        let cells: Vec<String> = row.iter().map(Cell::display).collect();

        match materialize(row, &mapping, schema) {
            Err(failure) => batch.invalid.push(InvalidRow {
                row_number,
                record: None,
                cells,
                errors: failure.messages,
            }),
            Ok(record) => match schema.validate(&record) {
                ValidationOutcome::Pass => batch.valid.push(ValidRow {
                    row_number,
                    record,
                    cells,
                }),
                ValidationOutcome::Fail(errors) => batch.invalid.push(InvalidRow {
                    row_number,
                    record: Some(record),
                    cells,
                    errors,
                }),
            },
        }
    }

    if batch.valid.is_empty() && batch.invalid.is_empty() {
        log_error("Sheet has no data rows");
        return Err(ReadError::EmptySheet.into());
    }

    print_batch_result(&batch);
    Ok(batch)
}

fn print_batch_result(batch: &ImportBatchResult) {
    if batch.skipped_blank > 0 {
        log_info(format!("Skipped {} blank rows", batch.skipped_blank));
    }
    if batch.is_clean() {
        log_success(format!("All {} rows valid!", batch.valid_count()));
        return;
    }

    log_success(format!("Valid: {}", batch.valid_count()));
    log_error(format!("Invalid: {}", batch.invalid_count()));
    for row in batch.invalid.iter().take(3) {
        log_error_indent(format!("Row {}: {}", row.row_number, row.errors.join(" | ")), 1);
    }
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        c => c.to_string(),
    }
}
