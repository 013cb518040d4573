//! Invalid-rows export and upload templates.
//!
//! Every row that needs attention, whichever stage rejected it, ends up in
//! one file laid out like the upload plus a leading [`ERROR_COLUMN`]. The
//! file can be corrected and uploaded again as is.

use serde::{Deserialize, Serialize};
use std::path::Path;

use rust_xlsxwriter::{Format, Workbook};

use crate::error::{ExportError, ExportResult};
use crate::models::{ImportBatchResult, ImportRecord, InvalidRow};
use crate::schema::RecordSchema;
use crate::transform::mapper::normalize_header;

/// Header of the column holding each row's messages.
pub const ERROR_COLUMN: &str = "ErrorMessages";

/// Separator between messages of one row.
pub const MESSAGE_SEPARATOR: &str = " | ";

const INVALID_ROWS_SUFFIX: &str = "_Invalid_Rows";
const TEMPLATE_SUFFIX: &str = "_Template";

/// Output file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

/// A rendered file ready for download or disk.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

impl ExportFile {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Header row plus text rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

// =============================================================================
// Invalid rows
// =============================================================================

/// Lay out the invalid set as a table.
///
/// With uploaded headers, the columns are exactly the uploaded columns in
/// file order, blank headers included (an uploaded `ErrorMessages` column is
/// replaced, not repeated). A column fed a field during import carries that
/// field's value; any other column carries its raw cell. Without headers,
/// every field of the schema is emitted in declaration order, headed by its
/// label.
pub fn invalid_rows_table(batch: &ImportBatchResult, schema: &RecordSchema) -> Table {
    let reserved = normalize_header(ERROR_COLUMN);
    let uploaded: Vec<(usize, &String)> = batch
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| normalize_header(h) != reserved)
        .collect();
    let has_headers = uploaded.iter().any(|(_, h)| !h.trim().is_empty());

    let mut headers = vec![ERROR_COLUMN.to_string()];
    let rows = if !has_headers {
        headers.extend(schema.fields().iter().map(|f| f.label().to_string()));
        batch
            .invalid
            .iter()
            .map(|row| {
                let mut cells = vec![row.errors.join(MESSAGE_SEPARATOR)];
                cells.extend(schema.fields().iter().enumerate().map(|(i, f)| {
                    record_value(row.record.as_ref(), &f.name)
                        .unwrap_or_else(|| raw_cell(row, i))
                }));
                cells
            })
            .collect()
    } else {
        headers.extend(uploaded.iter().map(|(_, h)| h.to_string()));
        batch
            .invalid
            .iter()
            .map(|row| {
                let mut cells = vec![row.errors.join(MESSAGE_SEPARATOR)];
                cells.extend(uploaded.iter().map(|(column, _)| {
                    batch
                        .mapping
                        .field_for_column(*column)
                        .and_then(|f| record_value(row.record.as_ref(), f))
                        .unwrap_or_else(|| raw_cell(row, *column))
                }));
                cells
            })
            .collect()
    };

    Table { headers, rows }
}

fn record_value(record: Option<&ImportRecord>, field: &str) -> Option<String> {
    record.and_then(|r| r.get(field)).map(|v| v.to_string())
}

fn raw_cell(row: &InvalidRow, column: usize) -> String {
    row.cells.get(column).cloned().unwrap_or_default()
}

/// Render the invalid set for download.
///
/// `upload_name` names the file (`<stem>_Invalid_Rows.<ext>`); without it
/// the schema name is used as the stem.
pub fn export_invalid_rows(
    batch: &ImportBatchResult,
    schema: &RecordSchema,
    format: ExportFormat,
    upload_name: Option<&str>,
) -> ExportResult<ExportFile> {
    let table = invalid_rows_table(batch, schema);
    let stem = upload_name
        .and_then(|n| Path::new(n).file_stem())
        .and_then(|s| s.to_str())
        .map(file_stem)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| schema.name().to_string());

    Ok(ExportFile {
        file_name: format!("{}{}.{}", stem, INVALID_ROWS_SUFFIX, format.extension()),
        format,
        bytes: render(&table, format, "Invalid Rows")?,
    })
}

// =============================================================================
// Templates
// =============================================================================

/// Blank upload template: field labels in declaration order, no rows.
pub fn template(schema: &RecordSchema, format: ExportFormat) -> ExportResult<ExportFile> {
    let table = Table {
        headers: schema.fields().iter().map(|f| f.label().to_string()).collect(),
        rows: Vec::new(),
    };

    Ok(ExportFile {
        file_name: format!("{}{}.{}", schema.name(), TEMPLATE_SUFFIX, format.extension()),
        format,
        bytes: render(&table, format, &sheet_name(schema.name()))?,
    })
}

// =============================================================================
// Writers
// =============================================================================

pub fn render(table: &Table, format: ExportFormat, sheet: &str) -> ExportResult<Vec<u8>> {
    match format {
        ExportFormat::Csv => write_csv(table),
        ExportFormat::Xlsx => write_xlsx(table, sheet),
    }
}

fn write_csv(table: &Table) -> ExportResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .map_err(|e| ExportError::Csv(e.to_string()))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| ExportError::Csv(e.to_string()))?;
    }
    writer.into_inner().map_err(|e| ExportError::Csv(e.to_string()))
}

fn write_xlsx(table: &Table, sheet: &str) -> ExportResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet).map_err(xlsx_error)?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &header_format)
            .map_err(xlsx_error)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            // Leave empty cells blank so they read back as blank.
            if value.is_empty() {
                continue;
            }
            worksheet
                .write_string(r as u32 + 1, col as u16, value)
                .map_err(xlsx_error)?;
        }
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

fn xlsx_error(e: rust_xlsxwriter::XlsxError) -> ExportError {
    ExportError::Xlsx(e.to_string())
}

/// Download names go into a quoted `Content-Disposition` value.
fn file_stem(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect()
}

/// Worksheet names are capped at 31 characters and exclude `[]:*?/\`.
fn sheet_name(name: &str) -> String {
    name.chars()
        .filter(|c| !"[]:*?/\\".contains(*c))
        .take(31)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownstreamFailure, FieldKind};
    use crate::parser::{read_bytes, ReadOptions};
    use crate::schema::{FieldDescriptor, SchemaDefinition};
    use crate::transform::{import_bytes, import_sheet, ImportOptions, MatchMode};
    use crate::validation::{Check, Rule};

    fn schema() -> RecordSchema {
        RecordSchema::compile(SchemaDefinition {
            name: "yard-location".into(),
            description: String::new(),
            fields: vec![
                FieldDescriptor::new("name", FieldKind::Text).with_label("Name").required(),
                FieldDescriptor::new("code", FieldKind::Code).with_label("Code").required(),
                FieldDescriptor::new("capacity", FieldKind::Integer).with_label("Capacity"),
            ],
            rules: vec![Rule::new("capacity", Check::Range { min: Some(1.0), max: Some(500.0) })],
        })
        .unwrap()
    }

    fn import(csv: &str) -> ImportBatchResult {
        let options = ImportOptions { match_mode: MatchMode::ByHeader, delimiter: None };
        import_bytes(csv.as_bytes(), Some("locations.csv"), &schema(), &options)
            .unwrap()
            .batch
    }

    fn csv_text(file: &ExportFile) -> String {
        String::from_utf8(file.bytes.clone()).unwrap()
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!(ExportFormat::parse("CSV").unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse("xlsx").unwrap(), ExportFormat::Xlsx);
        assert!(matches!(
            ExportFormat::parse("pdf"),
            Err(ExportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_invalid_rows_keep_upload_layout() {
        let batch = import("Name,Code,Capacity\nNorth,n1,10\n,s1,20\nEast,e1,900\n");
        let file = export_invalid_rows(&batch, &schema(), ExportFormat::Csv, Some("locations.csv")).unwrap();

        assert_eq!(file.file_name, "locations_Invalid_Rows.csv");
        assert_eq!(
            csv_text(&file),
            "ErrorMessages,Name,Code,Capacity\n\
             missing required field `Name`,,s1,20\n\
             `Capacity` must be between 1 and 500,East,E1,900\n"
        );
    }

    #[test]
    fn test_downstream_messages_come_last() {
        let mut batch = import("Name,Code,Capacity\nNorth,N1,10\nEast,E1,900\n");
        batch.merge_downstream(vec![DownstreamFailure {
            row_number: 2,
            message: "insert rejected by backend: duplicate code".into(),
        }]);
        batch.invalid[1].errors.push("insert rejected by backend: timeout".into());

        let table = invalid_rows_table(&batch, &schema());
        assert_eq!(table.rows[0][0], "insert rejected by backend: duplicate code");
        assert_eq!(
            table.rows[1][0],
            "`Capacity` must be between 1 and 500 | insert rejected by backend: timeout"
        );
    }

    #[test]
    fn test_fallback_to_field_labels() {
        let mut batch = import("Name,Code,Capacity\nEast,E1,900\n");
        batch.headers.clear();

        let table = invalid_rows_table(&batch, &schema());
        assert_eq!(table.headers, vec!["ErrorMessages", "Name", "Code", "Capacity"]);
        assert_eq!(table.rows[0][1..], ["East", "E1", "900"]);
    }

    #[test]
    fn test_corrected_export_reimports() {
        let schema = schema();
        let batch = import("Code,Name,Capacity,Notes\nn1,,10,call first\ns2,South,abc,\n");
        assert_eq!(batch.invalid_count(), 2);

        let file = export_invalid_rows(&batch, &schema, ExportFormat::Csv, None).unwrap();
        assert_eq!(file.file_name, "yard-location_Invalid_Rows.csv");

        // Columns: ErrorMessages, Code, Name, Capacity, Notes
        let corrected = csv_text(&file)
            .replace(",n1,,10,", ",n1,North,10,")
            .replace(",abc,", ",40,");

        let options = ImportOptions { match_mode: MatchMode::ByHeader, delimiter: None };
        let again = import_bytes(corrected.as_bytes(), None, &schema, &options).unwrap().batch;
        assert_eq!(again.invalid_count(), 0);
        assert_eq!(again.valid_count(), 2);
    }

    #[test]
    fn test_positional_export_keeps_columns_in_place() {
        let schema = schema();
        let options = ImportOptions { match_mode: MatchMode::Positional, delimiter: None };
        // Headers name other fields; position decides.
        let batch = import_bytes(b"Code,Name,Capacity\nx1,Alpha,900\n", None, &schema, &options)
            .unwrap()
            .batch;
        assert_eq!(batch.invalid_count(), 1);

        let file = export_invalid_rows(&batch, &schema, ExportFormat::Csv, None).unwrap();
        let text = csv_text(&file);
        assert_eq!(
            text,
            "ErrorMessages,Code,Name,Capacity\n\
             `Capacity` must be between 1 and 500,x1,ALPHA,900\n"
        );

        let corrected = text.replace(",900", ",90");
        let again = import_bytes(corrected.as_bytes(), None, &schema, &options).unwrap().batch;
        assert_eq!(again.valid_count(), 1);
        let record = &again.valid[0].record;
        assert_eq!(record.get("name").unwrap().to_string(), "x1");
        assert_eq!(record.get("code").unwrap().to_string(), "ALPHA");
    }

    #[test]
    fn test_blank_header_column_is_kept() {
        let schema = schema();
        let options = ImportOptions { match_mode: MatchMode::Positional, delimiter: None };
        let batch = import_bytes(b"Name,,Capacity\nNorth,N1,900\n", None, &schema, &options)
            .unwrap()
            .batch;

        let table = invalid_rows_table(&batch, &schema);
        assert_eq!(table.headers, vec!["ErrorMessages", "Name", "", "Capacity"]);
        assert_eq!(table.rows[0][1..], ["North", "N1", "900"]);

        let file = export_invalid_rows(&batch, &schema, ExportFormat::Csv, None).unwrap();
        let corrected = csv_text(&file).replace(",900", ",90");
        let again = import_bytes(corrected.as_bytes(), None, &schema, &options).unwrap().batch;
        assert_eq!(again.valid_count(), 1);
        assert_eq!(again.valid[0].record.get("code").unwrap().to_string(), "N1");
    }

    #[test]
    fn test_error_column_upload_is_not_duplicated() {
        let schema = schema();
        let csv = "ErrorMessages,Name,Code\nold message,,X1\n";
        let sheet = read_bytes(csv.as_bytes(), None, &ReadOptions::default()).unwrap();
        let options = ImportOptions { match_mode: MatchMode::Positional, delimiter: None };
        let batch = import_sheet(&sheet, &schema, &options).unwrap();

        let table = invalid_rows_table(&batch, &schema);
        assert_eq!(table.headers, vec!["ErrorMessages", "Name", "Code"]);
        assert_eq!(
            table.rows,
            vec![vec!["missing required field `Name`".to_string(), String::new(), "X1".to_string()]]
        );
    }

    #[test]
    fn test_xlsx_export_reads_back() {
        let schema = schema();
        let batch = import("Name,Code,Capacity\nEast,E1,900\n");
        let file = export_invalid_rows(&batch, &schema, ExportFormat::Xlsx, Some("in.xlsx")).unwrap();
        assert_eq!(file.file_name, "in_Invalid_Rows.xlsx");

        let sheet = read_bytes(&file.bytes, Some(&file.file_name), &ReadOptions::default()).unwrap();
        assert_eq!(sheet.headers, vec!["ErrorMessages", "Name", "Code", "Capacity"]);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0][1].display(), "East");
    }

    #[test]
    fn test_templates() {
        let schema = schema();
        let csv = template(&schema, ExportFormat::Csv).unwrap();
        assert_eq!(csv.file_name, "yard-location_Template.csv");
        assert_eq!(csv_text(&csv), "Name,Code,Capacity\n");

        let xlsx = template(&schema, ExportFormat::Xlsx).unwrap();
        assert_eq!(xlsx.file_name, "yard-location_Template.xlsx");
        let sheet = read_bytes(&xlsx.bytes, Some("t.xlsx"), &ReadOptions::default()).unwrap();
        assert_eq!(sheet.headers, vec!["Name", "Code", "Capacity"]);
        assert!(sheet.rows.is_empty());
    }

    #[test]
    fn test_upload_name_is_quoted_safely() {
        let batch = import("Name,Code,Capacity\nEast,E1,900\n");
        let file = export_invalid_rows(&batch, &schema(), ExportFormat::Csv, Some("we\"ek\t1.csv")).unwrap();
        assert_eq!(file.file_name, "week1_Invalid_Rows.csv");

        let file = export_invalid_rows(&batch, &schema(), ExportFormat::Csv, Some("\".csv")).unwrap();
        assert_eq!(file.file_name, "yard-location_Invalid_Rows.csv");
    }

    #[test]
    fn test_sheet_name_is_sanitized() {
        assert_eq!(sheet_name("a/b:c"), "abc");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
    }
}
