//! REST API types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ImportError, ReadError, SchemaError, ServerError};
use crate::models::ImportBatchResult;
use crate::schema::{FieldDescriptor, RecordSchema};
use crate::sink::InsertedRecord;
use crate::transform::pipeline::{ImportRun, SourceInfo};
use crate::validation::Rule;

/// Query string of the validate and import endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    /// `header` or `position`.
    #[serde(rename = "match")]
    pub match_mode: Option<String>,
    /// Export format of the invalid-rows file.
    pub format: Option<String>,
    /// Force a delimiter for text uploads.
    pub delimiter: Option<char>,
}

/// Query string of the template endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TemplateQuery {
    pub format: Option<String>,
}

/// One entry of `GET /api/schemas`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSummary {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldDescriptor>,
    pub rules: Vec<Rule>,
}

impl From<&RecordSchema> for SchemaSummary {
    fn from(schema: &RecordSchema) -> Self {
        let definition = schema.definition();
        Self {
            name: definition.name,
            description: definition.description,
            fields: definition.fields,
            rules: definition.rules,
        }
    }
}

/// Messages of one invalid row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowErrors {
    pub row_number: usize,
    pub errors: Vec<String>,
}

/// JSON answer of the validate and import endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    /// Unique job identifier
    pub job_id: String,
    /// Status: "ready" or "warning"
    pub status: String,
    pub schema: String,
    pub source: SourceInfo,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub skipped_blank: usize,
    pub invalid: Vec<RowErrors>,
    /// Keys assigned downstream (import only).
    pub inserted: Vec<InsertedRecord>,
    pub dry_run: bool,
}

impl ImportResponse {
    pub fn new(run: &ImportRun, inserted: Vec<InsertedRecord>, dry_run: bool) -> Self {
        let batch: &ImportBatchResult = &run.batch;
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: if batch.is_clean() { "ready" } else { "warning" }.to_string(),
            schema: batch.schema.clone(),
            source: run.source.clone(),
            valid_count: batch.valid_count(),
            invalid_count: batch.invalid_count(),
            skipped_blank: batch.skipped_blank,
            invalid: batch
                .invalid
                .iter()
                .map(|row| RowErrors {
                    row_number: row.row_number,
                    errors: row.errors.clone(),
                })
                .collect(),
            inserted,
            dry_run,
        }
    }
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Import(ImportError::Read(ReadError::Io(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Import(ImportError::Read(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Import(ImportError::Schema(SchemaError::NotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Import(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), Json(error_response(&self.to_string()))).into_response()
    }
}
