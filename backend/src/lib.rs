//! # Yardload - Bulk import for yard and logistics records
//!
//! Yardload reads CSV and spreadsheet uploads, maps their columns onto a
//! record schema (vehicles, yard locations, transport orders), validates
//! every row and hands back one correction file for every row that needs
//! attention.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / XLSX  │────▶│   Parser    │────▶│  Transform  │────▶│    Sink     │
//! │   upload    │     │ (auto-fmt)  │     │ (map+check) │     │  (insert)   │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └──────┬──────┘
//!                                                │ invalid rows      │ rejections
//!                                                ▼                   ▼
//!                                         ┌──────────────────────────────┐
//!                                         │ Export (<name>_Invalid_Rows) │
//!                                         └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use yardload::{export_invalid_rows, import_file, ExportFormat, ImportOptions, SchemaRegistry};
//!
//! let schema = SchemaRegistry::builtin().require("vehicle")?;
//! let run = import_file("arrivals.csv", &schema, &ImportOptions::default())?;
//! if !run.batch.is_clean() {
//!     let file = export_invalid_rows(&run.batch, &schema, ExportFormat::Csv, Some("arrivals.csv"))?;
//!     std::fs::write(&file.file_name, &file.bytes)?;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Field values, records and batch results
//! - [`schema`] - Field descriptors and compiled record schemas
//! - [`validation`] - Declarative rule table
//! - [`parser`] - CSV and workbook reading with auto-detection
//! - [`transform`] - Mapping, materialization and the batch pipeline
//! - [`registry`] - Built-in and on-disk schemas
//! - [`export`] - Invalid-rows files and upload templates
//! - [`sink`] - Downstream insert collaborator
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;
pub mod schema;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Schemas
pub mod registry;

// Output
pub mod export;
pub mod sink;

pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ExportError, ImportError, ReadError, SchemaError, ServerError, SinkError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    DownstreamFailure, FieldKind, FieldValue, ImportBatchResult, ImportRecord, InvalidRow,
    ValidRow, ValidationOutcome,
};

// =============================================================================
// Re-exports - Schemas and validation
// =============================================================================

pub use registry::SchemaRegistry;
pub use schema::{FieldDescriptor, RecordSchema, SchemaDefinition};
pub use validation::{is_valid, validate, Check, Rule};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, read_bytes, read_file, Cell, ReadOptions,
    Sheet, SourceFormat,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{
    build_mapping, import_bytes, import_file, import_sheet, materialize, normalize_header,
    FieldMapping, ImportOptions, ImportRun, MatchMode, SourceInfo,
};

// =============================================================================
// Re-exports - Export and sink
// =============================================================================

pub use export::{export_invalid_rows, template, ExportFile, ExportFormat, ERROR_COLUMN};
pub use sink::{submit, ApiSink, DryRunSink, RecordSink, Sink, SubmitReport};

pub use config::Config;

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
