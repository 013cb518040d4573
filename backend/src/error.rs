//! Error types for the Yardload import pipeline.
//!
//! Errors are layered the same way the pipeline is:
//!
//! - [`ReadError`] - structural failures while reading an upload
//! - [`SchemaError`] - invalid or unknown record schemas
//! - [`ExportError`] - failures writing invalid-row or template files
//! - [`SinkError`] - downstream insert failures
//! - [`ConfigError`] - bad environment configuration
//! - [`ImportError`] - top-level orchestration errors
//!
//! Row-level problems (coercion, validation, rejected inserts) are never
//! errors here: they are data carried inside an
//! [`ImportBatchResult`](crate::models::ImportBatchResult).

use thiserror::Error;

// =============================================================================
// Read Errors (structural)
// =============================================================================

/// Failures that make an upload unusable as a whole.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited text.
    #[error("Invalid CSV content: {0}")]
    Csv(String),

    /// Workbook could not be opened or has no worksheet.
    #[error("Invalid workbook: {0}")]
    Workbook(String),

    /// No rows at all.
    #[error("File is empty")]
    EmptyFile,

    /// Header row present but without any non-blank label.
    #[error("No headers found in file")]
    NoHeaders,

    /// Header row present but no non-blank data row follows.
    #[error("Sheet has no data rows after the header")]
    EmptySheet,
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors while loading or compiling a record schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema JSON could not be deserialized.
    #[error("Schema JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema file could not be read.
    #[error("Schema IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema declares no fields.
    #[error("Schema '{0}' declares no fields")]
    NoFields(String),

    /// Two fields normalize to the same header.
    #[error("Schema '{schema}' declares field '{field}' more than once")]
    DuplicateField { schema: String, field: String },

    /// A rule refers to a field the schema does not declare.
    #[error("Rule on '{rule_field}' refers to unknown field '{field}'")]
    UnknownField { rule_field: String, field: String },

    /// A pattern rule holds an invalid regular expression.
    #[error("Invalid pattern for field '{field}': {message}")]
    InvalidPattern { field: String, message: String },

    /// No schema registered under this name.
    #[error("Unknown schema: {0}")]
    NotFound(String),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while writing an export or template file.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV writer failure.
    #[error("CSV export failed: {0}")]
    Csv(String),

    /// XLSX writer failure.
    #[error("XLSX export failed: {0}")]
    Xlsx(String),

    /// Unknown export format name.
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Errors from the downstream insert collaborator.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The request never got a response.
    #[error("Request failed: {0}")]
    Request(String),

    /// The backend answered and refused the record.
    #[error("Insert rejected: {0}")]
    Rejected(String),

    /// The backend accepted the record but the answer was unusable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SinkError {
    /// Message shown to the user in the invalid-rows file.
    pub fn user_message(&self) -> String {
        match self {
            SinkError::Rejected(message) => format!("insert rejected by backend: {}", message),
            other => other.to_string(),
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds an unparsable value.
    #[error("Invalid value '{value}' for {var}")]
    InvalidValue { var: String, value: String },
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Top-level pipeline error.
///
/// Returned by [`crate::transform::pipeline::import_bytes`] and friends.
/// Only structural problems end up here.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Upload could not be read.
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    /// Schema problem.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Export problem.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for read operations.
pub type ReadResult<T> = Result<T, ReadError>;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for pipeline operations.
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let read_err = ReadError::EmptySheet;
        let import_err: ImportError = read_err.into();
        assert!(import_err.to_string().contains("no data rows"));

        let schema_err = SchemaError::NotFound("trailer".into());
        let import_err: ImportError = schema_err.into();
        assert!(import_err.to_string().contains("trailer"));

        let server_err: ServerError = import_err.into();
        assert!(server_err.to_string().contains("Unknown schema"));
    }

    #[test]
    fn test_sink_user_message() {
        let err = SinkError::Rejected("duplicate VIN".into());
        assert_eq!(err.user_message(), "insert rejected by backend: duplicate VIN");

        let err = SinkError::Request("connection refused".into());
        assert!(err.user_message().contains("connection refused"));
    }

    #[test]
    fn test_pattern_error_format() {
        let err = SchemaError::InvalidPattern {
            field: "vin".into(),
            message: "unclosed group".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("vin"));
        assert!(msg.contains("unclosed group"));
    }
}
