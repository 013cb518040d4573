//! HTTP Server for the yardload API.
//!
//! # API Endpoints
//!
//! | Method | Path                       | Description                              |
//! |--------|----------------------------|------------------------------------------|
//! | GET    | `/health`                  | Health check                             |
//! | GET    | `/api/schemas`             | Known schemas and their fields           |
//! | GET    | `/api/templates/{schema}`  | Blank upload template                    |
//! | POST   | `/api/validate/{schema}`   | Check an upload without inserting        |
//! | POST   | `/api/import/{schema}`     | Import an upload                         |
//! | GET    | `/api/logs`                | SSE stream for real-time logs            |
//!
//! Uploads are multipart forms with a `file` field. Validate and import
//! accept `?match=header|position`; import and templates accept
//! `?format=csv|xlsx`. An import with rows to correct answers with the
//! invalid-rows file as an attachment instead of JSON.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderName, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{ImportResponse, SchemaSummary, TemplateQuery, UploadQuery};
use crate::config::Config;
use crate::error::{ImportError, ServerError};
use crate::export::{export_invalid_rows, template, ExportFile, ExportFormat};
use crate::registry::SchemaRegistry;
use crate::schema::RecordSchema;
use crate::sink::{submit, Sink};
use crate::transform::{import_bytes, ImportOptions, ImportRun, MatchMode};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

static VALID_COUNT: HeaderName = HeaderName::from_static("x-valid-count");
static INVALID_COUNT: HeaderName = HeaderName::from_static("x-invalid-count");

/// Shared, read-only server state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SchemaRegistry>,
    pub sink: Sink,
    pub export_format: ExportFormat,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let registry = match &config.schema_dir {
            Some(dir) => SchemaRegistry::with_dir(dir).map_err(ImportError::from)?,
            None => SchemaRegistry::builtin().clone(),
        };

        Ok(Self {
            registry: Arc::new(registry),
            sink: Sink::from_settings(config.api_url.as_deref(), config.api_token.as_deref()),
            export_format: config.export_format,
        })
    }

    fn schema(&self, name: &str) -> Result<Arc<RecordSchema>, ServerError> {
        Ok(self.registry.require(name).map_err(ImportError::from)?)
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            header::CONTENT_TYPE,
            header::CONTENT_DISPOSITION,
            VALID_COUNT.clone(),
            INVALID_COUNT.clone(),
        ]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/schemas", get(list_schemas))
        .route("/api/templates/{schema}", get(download_template))
        .route("/api/validate/{schema}", post(validate_upload))
        .route("/api/import/{schema}", post(import_upload))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_config(&config)?;
    let app = router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Yardload server running on http://localhost:{}", config.port);
    tracing::info!("   Schemas: {}", state.registry.names().join(", "));
    match &config.api_url {
        Some(url) => tracing::info!("   Inserting into {}", url),
        None => tracing::warn!("   YARDLOAD_API_URL not set, imports are dry runs"),
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "yardload",
        "version": env!("CARGO_PKG_VERSION"),
        "dryRun": state.sink.is_dry_run(),
        "schemas": state.registry.names(),
    }))
}

async fn list_schemas(State(state): State<AppState>) -> Json<Vec<SchemaSummary>> {
    Json(
        state
            .registry
            .list()
            .iter()
            .map(|schema| SchemaSummary::from(schema.as_ref()))
            .collect(),
    )
}

async fn download_template(
    State(state): State<AppState>,
    Path(schema): Path<String>,
    Query(query): Query<TemplateQuery>,
) -> Result<Response, ServerError> {
    let schema = state.schema(&schema)?;
    let format = export_format(query.format.as_deref(), state.export_format)?;
    let file = template(&schema, format).map_err(ImportError::from)?;
    Ok(attachment(file, &[]))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Check an upload and report, without inserting anything
async fn validate_upload(
    State(state): State<AppState>,
    Path(schema): Path<String>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Result<Json<ImportResponse>, ServerError> {
    let schema = state.schema(&schema)?;
    let options = import_options(&query)?;
    let (file_name, bytes) = read_upload(multipart).await?;

    let run = run_import(&bytes, file_name.as_deref(), &schema, &options)?;
    Ok(Json(ImportResponse::new(&run, Vec::new(), state.sink.is_dry_run())))
}

/// Import an upload: insert the valid rows, hand back every other row
async fn import_upload(
    State(state): State<AppState>,
    Path(schema): Path<String>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    let schema = state.schema(&schema)?;
    let options = import_options(&query)?;
    let format = export_format(query.format.as_deref(), state.export_format)?;
    let (file_name, bytes) = read_upload(multipart).await?;

    let mut run = run_import(&bytes, file_name.as_deref(), &schema, &options)?;
    let report = submit(&mut run.batch, &state.sink).await;

    if run.batch.is_clean() {
        return Ok(Json(ImportResponse::new(&run, report.inserted, state.sink.is_dry_run())).into_response());
    }

    let file = export_invalid_rows(&run.batch, &schema, format, file_name.as_deref())
        .map_err(ImportError::from)?;
    log_info(format!("📥 Returning {} ({} rows to correct)", file.file_name, run.batch.invalid_count()));

    let counts = [
        (VALID_COUNT.clone(), report.inserted.len().to_string()),
        (INVALID_COUNT.clone(), run.batch.invalid_count().to_string()),
    ];
    Ok(attachment(file, &counts))
}

fn run_import(
    bytes: &[u8],
    file_name: Option<&str>,
    schema: &RecordSchema,
    options: &ImportOptions,
) -> Result<ImportRun, ServerError> {
    log_info(format!(
        "📄 New upload: {} ({} bytes) as '{}'",
        file_name.unwrap_or("unknown"),
        bytes.len(),
        schema.name()
    ));
    Ok(import_bytes(bytes, file_name, schema, options)?)
}

/// Pull the `file` field out of a multipart upload
async fn read_upload(mut multipart: Multipart) -> Result<(Option<String>, Vec<u8>), ServerError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?
                    .to_vec(),
            );
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;
    Ok((file_name, bytes))
}

fn import_options(query: &UploadQuery) -> Result<ImportOptions, ServerError> {
    let match_mode = match query.match_mode.as_deref() {
        None => MatchMode::default(),
        Some(value) => MatchMode::parse(value)
            .ok_or_else(|| ServerError::BadRequest(format!("Unknown match mode: {}", value)))?,
    };

    Ok(ImportOptions {
        match_mode,
        delimiter: query.delimiter,
    })
}

fn export_format(requested: Option<&str>, default: ExportFormat) -> Result<ExportFormat, ServerError> {
    match requested {
        None => Ok(default),
        Some(value) => ExportFormat::parse(value).map_err(|e| ServerError::BadRequest(e.to_string())),
    }
}

fn attachment(file: ExportFile, extra: &[(HeaderName, String)]) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", file.file_name);
    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response();

    for (name, value) in extra {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(name.clone(), value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::multipart::{Form, Part};

    const LOCATIONS: &str = "Location Code,Name,Yard Id,Capacity\n\
                             a-01,North Row,1,40\n\
                             A-02,South Row,1,0\n";

    async fn spawn_server() -> String {
        let state = AppState {
            registry: Arc::new(SchemaRegistry::builtin().clone()),
            sink: Sink::from_settings(None, None),
            export_format: ExportFormat::Csv,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn upload(name: &str, content: &str) -> Form {
        Form::new().part("file", Part::bytes(content.as_bytes().to_vec()).file_name(name.to_string()))
    }

    #[tokio::test]
    async fn test_health_and_schemas() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let health: Value = client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["dryRun"], true);

        let schemas: Value = client.get(format!("{}/api/schemas", base)).send().await.unwrap().json().await.unwrap();
        let names: Vec<&str> = schemas
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["transport-order", "vehicle", "yard-location"]);
    }

    #[tokio::test]
    async fn test_template_download() {
        let base = spawn_server().await;
        let response = reqwest::get(format!("{}/api/templates/yard-location", base)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"yard-location_Template.csv\""
        );
        assert_eq!(
            response.text().await.unwrap(),
            "Location Code,Name,Yard Id,Capacity,Active,Opened On\n"
        );
    }

    #[tokio::test]
    async fn test_validate_reports_without_inserting() {
        let base = spawn_server().await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/validate/yard-location?match=header", base))
            .multipart(upload("rows.csv", LOCATIONS))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "warning");
        assert_eq!(body["validCount"], 1);
        assert_eq!(body["invalidCount"], 1);
        assert_eq!(body["invalid"][0]["rowNumber"], 3);
        assert_eq!(body["invalid"][0]["errors"][0], "`Capacity` must be between 1 and 10000");
        assert_eq!(body["inserted"], json!([]));
    }

    #[tokio::test]
    async fn test_import_returns_correction_file() {
        let base = spawn_server().await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/import/yard-location?match=header", base))
            .multipart(upload("rows.csv", LOCATIONS))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-valid-count"], "1");
        assert_eq!(response.headers()["x-invalid-count"], "1");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"rows_Invalid_Rows.csv\""
        );
        assert_eq!(
            response.text().await.unwrap(),
            "ErrorMessages,Location Code,Name,Yard Id,Capacity\n\
             `Capacity` must be between 1 and 10000,A-02,South Row,1,0\n"
        );
    }

    #[tokio::test]
    async fn test_clean_import_returns_keys() {
        let base = spawn_server().await;
        let csv = "Location Code,Name,Yard Id,Capacity\nA-01,North Row,1,40\n";
        let body: Value = reqwest::Client::new()
            .post(format!("{}/api/import/yard-location", base))
            .multipart(upload("rows.csv", csv))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "ready");
        assert_eq!(body["inserted"][0]["rowNumber"], 2);
        assert_eq!(body["inserted"][0]["key"], "dry-run-1");
    }

    #[tokio::test]
    async fn test_request_errors() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let unknown = client
            .post(format!("{}/api/validate/trailer", base))
            .multipart(upload("rows.csv", LOCATIONS))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let no_file = client
            .post(format!("{}/api/validate/yard-location", base))
            .multipart(Form::new().text("note", "nothing here"))
            .send()
            .await
            .unwrap();
        assert_eq!(no_file.status(), StatusCode::BAD_REQUEST);

        let bad_mode = client
            .post(format!("{}/api/validate/yard-location?match=diagonal", base))
            .multipart(upload("rows.csv", LOCATIONS))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_mode.status(), StatusCode::BAD_REQUEST);

        let empty = client
            .post(format!("{}/api/validate/yard-location", base))
            .multipart(upload("rows.csv", "Location Code,Name\n,\n"))
            .send()
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = empty.json().await.unwrap();
        assert_eq!(body["status"], "error");
    }
}
