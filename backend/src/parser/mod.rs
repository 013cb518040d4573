//! Upload reader with format, encoding and delimiter auto-detection.
//!
//! Turns the raw bytes of an upload into a [`Sheet`]: the header row plus
//! typed raw [`Cell`]s. Delimited text goes through [`delimited`],
//! spreadsheets through [`workbook`]. No schema-specific logic here.

pub mod delimited;
pub mod workbook;

use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::Path;

use crate::error::{ReadError, ReadResult};

/// A raw cell, typed by what the source file stored.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
    Blank,
    /// Last evaluated display value of a formula.
    Formula(String),
    /// Spreadsheet error value such as `#DIV/0!`.
    Error(String),
    /// A cell kind the reader does not understand.
    Unknown,
}

impl Cell {
    /// Cell from delimited text: empty or whitespace-only becomes `Blank`.
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Blank
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    /// Blank, or text/formula output that is only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Blank => true,
            Cell::Text(s) | Cell::Formula(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text a user would see in the cell.
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) | Cell::Formula(s) | Cell::Error(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Boolean(b) => b.to_string(),
            Cell::Date(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
                }
            }
            Cell::Blank | Cell::Unknown => String::new(),
        }
    }
}

/// Render a number without a trailing `.0` for whole values.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Physical format of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// CSV-like text.
    Delimited,
    /// xlsx / xlsm / xlsb / xls / ods.
    Workbook,
}

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const OLE_MAGIC: [u8; 4] = [0xD0, 0xCF, 0x11, 0xE0];

impl SourceFormat {
    /// Detect by file extension, falling back to magic bytes.
    pub fn detect(file_name: Option<&str>, bytes: &[u8]) -> Self {
        let extension = file_name
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match extension.as_deref() {
            Some(ext) if WORKBOOK_EXTENSIONS.contains(&ext) => SourceFormat::Workbook,
            Some("csv") | Some("txt") | Some("tsv") => SourceFormat::Delimited,
            _ if bytes.starts_with(&ZIP_MAGIC) || bytes.starts_with(&OLE_MAGIC) => {
                SourceFormat::Workbook
            }
            _ => SourceFormat::Delimited,
        }
    }
}

/// Parsed upload: header row, data rows, and what was detected.
#[derive(Debug, Clone)]
pub struct Sheet {
    /// Header labels, trimmed, in file order.
    pub headers: Vec<String>,
    /// Data rows (header excluded), in file order.
    pub rows: Vec<Vec<Cell>>,
    pub format: SourceFormat,
    /// Detected text encoding (delimited text only).
    pub encoding: Option<String>,
    /// Detected or requested delimiter (delimited text only).
    pub delimiter: Option<char>,
}

impl Sheet {
    /// Split raw rows into header and data. Fails on an empty file or a
    /// header row with no label.
    pub fn from_rows(
        mut rows: Vec<Vec<Cell>>,
        format: SourceFormat,
        encoding: Option<String>,
        delimiter: Option<char>,
    ) -> ReadResult<Self> {
        if rows.is_empty() {
            return Err(ReadError::EmptyFile);
        }

        let header_row = rows.remove(0);
        if header_row.iter().all(Cell::is_blank) {
            return Err(ReadError::NoHeaders);
        }
        let headers = header_row.iter().map(|c| c.display().trim().to_string()).collect();

        Ok(Self {
            headers,
            rows,
            format,
            encoding,
            delimiter,
        })
    }
}

/// Options for reading an upload.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Force a delimiter instead of detecting one.
    pub delimiter: Option<char>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to string using the specified encoding.
///
/// Unknown encodings and invalid UTF-8 fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Ties go to the earlier candidate in `; , TAB |`; no candidate at all
/// means a single-column file and `,` is used.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Read an upload of either format.
pub fn read_bytes(bytes: &[u8], file_name: Option<&str>, options: &ReadOptions) -> ReadResult<Sheet> {
    if bytes.is_empty() {
        return Err(ReadError::EmptyFile);
    }

    match SourceFormat::detect(file_name, bytes) {
        SourceFormat::Workbook => {
            let rows = workbook::parse_workbook(bytes)?;
            Sheet::from_rows(rows, SourceFormat::Workbook, None, None)
        }
        SourceFormat::Delimited => {
            let encoding = detect_encoding(bytes);
            let content = decode_content(bytes, &encoding);
            let delimiter = options.delimiter.unwrap_or_else(|| detect_delimiter(&content));
            let rows = delimited::parse_delimited(&content, delimiter)?;
            Sheet::from_rows(rows, SourceFormat::Delimited, Some(encoding), Some(delimiter))
        }
    }
}

/// Read an upload from disk. The file is read whole and closed before parsing.
pub fn read_file<P: AsRef<Path>>(path: P, options: &ReadOptions) -> ReadResult<Sheet> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let file_name = path.file_name().and_then(|n| n.to_str());
    read_bytes(&bytes, file_name, options)
}
