//! Downstream insert collaborator.
//!
//! Valid records are handed to a [`RecordSink`] one by one. The sink returns
//! the key it assigned or refuses the record; refusals are folded back into
//! the batch as [`DownstreamFailure`]s so they land in the same correction
//! file as validation failures.
//!
//! ```rust,ignore
//! use yardload::sink::{submit, DryRunSink};
//!
//! let report = submit(&mut batch, &DryRunSink::new()).await;
//! println!("{} inserted, {} rejected", report.inserted.len(), report.rejected);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::{SinkError, SinkResult};
use crate::models::{DownstreamFailure, ImportBatchResult};

/// Something that stores records and hands back their keys.
pub trait RecordSink {
    /// Insert one record (a JSON object) of the named schema.
    fn insert(&self, schema: &str, record: &Value) -> impl Future<Output = SinkResult<String>> + Send;
}

// =============================================================================
// HTTP sink
// =============================================================================

/// Inserts records through the remote yard API.
#[derive(Clone)]
pub struct ApiSink {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// Successful insert answer.
#[derive(Debug, Deserialize)]
struct InsertResponse {
    id: Value,
}

/// Error answer.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl ApiSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every insert.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RecordSink for ApiSink {
    async fn insert(&self, schema: &str, record: &Value) -> SinkResult<String> {
        let url = format!("{}/{}", self.base_url, schema);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(record);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SinkError::Request(e.to_string()))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorBody>(&body) {
                return Err(SinkError::Rejected(error.message));
            }
            return Err(SinkError::Rejected(format!("HTTP {}", status)));
        }

        let response: InsertResponse =
            serde_json::from_str(&body).map_err(|e| SinkError::InvalidResponse(e.to_string()))?;

        match response.id {
            Value::String(id) if !id.is_empty() => Ok(id),
            Value::Number(id) => Ok(id.to_string()),
            other => Err(SinkError::InvalidResponse(format!("unusable id: {}", other))),
        }
    }
}

// =============================================================================
// Dry run
// =============================================================================

/// Assigns sequential keys and stores nothing.
#[derive(Debug, Default)]
pub struct DryRunSink {
    next: AtomicU64,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for DryRunSink {
    async fn insert(&self, _schema: &str, _record: &Value) -> SinkResult<String> {
        let key = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("dry-run-{}", key))
    }
}

/// The sink picked from configuration.
#[derive(Clone)]
pub enum Sink {
    Api(ApiSink),
    DryRun(std::sync::Arc<DryRunSink>),
}

impl Sink {
    /// Remote sink when a base URL is configured, dry run otherwise.
    pub fn from_settings(api_url: Option<&str>, token: Option<&str>) -> Self {
        match api_url {
            Some(url) => {
                let sink = ApiSink::new(url);
                Sink::Api(match token {
                    Some(token) => sink.with_token(token),
                    None => sink,
                })
            }
            None => Sink::DryRun(Default::default()),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Sink::DryRun(_))
    }
}

impl RecordSink for Sink {
    async fn insert(&self, schema: &str, record: &Value) -> SinkResult<String> {
        match self {
            Sink::Api(sink) => sink.insert(schema, record).await,
            Sink::DryRun(sink) => sink.insert(schema, record).await,
        }
    }
}

// =============================================================================
// Submission
// =============================================================================

/// A record the sink accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertedRecord {
    pub row_number: usize,
    pub key: String,
}

/// Outcome of [`submit`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReport {
    pub inserted: Vec<InsertedRecord>,
    pub rejected: usize,
}

/// Insert every valid record, in row order, and merge refusals into the batch.
///
/// No retries: a refused row is reported, never resubmitted.
pub async fn submit<S: RecordSink>(batch: &mut ImportBatchResult, sink: &S) -> SubmitReport {
    log_info(format!("📤 Submitting {} records...", batch.valid_count()));

    let mut report = SubmitReport::default();
    let mut failures = Vec::new();

    for row in &batch.valid {
        match sink.insert(&batch.schema, &row.record.to_json()).await {
            Ok(key) => report.inserted.push(InsertedRecord {
                row_number: row.row_number,
                key,
            }),
            Err(e) => {
                log_warning(format!("Row {}: {}", row.row_number, e));
                failures.push(DownstreamFailure {
                    row_number: row.row_number,
                    message: e.user_message(),
                });
            }
        }
    }

    report.rejected = batch.merge_downstream(failures);
    log_success(format!(
        "Inserted {} records ({} rejected)",
        report.inserted.len(),
        report.rejected
    ));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldKind;
    use crate::schema::{FieldDescriptor, RecordSchema, SchemaDefinition};
    use crate::transform::{import_bytes, ImportOptions};
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::json;

    fn batch(csv: &str) -> ImportBatchResult {
        let schema = RecordSchema::compile(SchemaDefinition {
            name: "yard-location".into(),
            description: String::new(),
            fields: vec![
                FieldDescriptor::new("code", FieldKind::Code).required(),
                FieldDescriptor::new("capacity", FieldKind::Integer),
            ],
            rules: vec![],
        })
        .unwrap();
        import_bytes(csv.as_bytes(), None, &schema, &ImportOptions::default())
            .unwrap()
            .batch
    }

    /// Refuses code `DUP`, answers 500 without a body for `BOOM`.
    async fn insert_handler(
        Path(schema): Path<String>,
        headers: HeaderMap,
        Json(record): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        assert_eq!(schema, "yard-location");
        assert_eq!(
            headers.get("authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer secret")
        );
        match record["code"].as_str() {
            Some("DUP") => (
                StatusCode::CONFLICT,
                Json(json!({ "message": "location code already exists" })),
            ),
            Some("BOOM") => (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Null)),
            Some(code) => (StatusCode::CREATED, Json(json!({ "id": format!("loc-{}", code) }))),
            None => (StatusCode::BAD_REQUEST, Json(json!({ "message": "no code" }))),
        }
    }

    async fn spawn_api() -> String {
        let app = Router::new().route("/api/{schema}", post(insert_handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/", addr)
    }

    #[tokio::test]
    async fn test_dry_run_assigns_sequential_keys() {
        let mut batch = batch("Code,Capacity\na,1\nb,2\n");
        let report = submit(&mut batch, &DryRunSink::new()).await;

        assert_eq!(
            report.inserted,
            vec![
                InsertedRecord { row_number: 2, key: "dry-run-1".into() },
                InsertedRecord { row_number: 3, key: "dry-run-2".into() },
            ]
        );
        assert_eq!(report.rejected, 0);
        assert!(batch.is_clean());
    }

    #[tokio::test]
    async fn test_api_sink_merges_rejections() {
        let base_url = spawn_api().await;
        let sink = ApiSink::new(base_url).with_token("secret");
        let mut batch = batch("Code,Capacity\nA1,1\nDUP,2\nB2,3\nBOOM,4\n");

        let report = submit(&mut batch, &sink).await;

        assert_eq!(
            report.inserted,
            vec![
                InsertedRecord { row_number: 2, key: "loc-A1".into() },
                InsertedRecord { row_number: 4, key: "loc-B2".into() },
            ]
        );
        assert_eq!(report.rejected, 2);
        assert_eq!(batch.valid_count(), 2);
        assert_eq!(batch.invalid[0].row_number, 3);
        assert_eq!(
            batch.invalid[0].errors,
            vec!["insert rejected by backend: location code already exists".to_string()]
        );
        assert_eq!(batch.invalid[1].row_number, 5);
        assert_eq!(
            batch.invalid[1].errors,
            vec!["insert rejected by backend: HTTP 500 Internal Server Error".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unreachable_api_is_a_row_failure() {
        let sink = ApiSink::new("http://127.0.0.1:9/api");
        let mut batch = batch("Code\nA1\n");

        let report = submit(&mut batch, &sink).await;
        assert!(report.inserted.is_empty());
        assert_eq!(batch.invalid_count(), 1);
        assert!(batch.invalid[0].errors[0].starts_with("Request failed:"));
    }

    #[test]
    fn test_sink_from_settings() {
        assert!(Sink::from_settings(None, Some("token")).is_dry_run());
        match Sink::from_settings(Some("https://yard.example/api/"), None) {
            Sink::Api(sink) => assert_eq!(sink.base_url(), "https://yard.example/api"),
            Sink::DryRun(_) => panic!("expected api sink"),
        }
    }
}
