//! HTTP service: a single `POST /process` endpoint.
//!
//! The request is `multipart/form-data` with either a `file` upload or a
//! `pdf_url` text field (the upload wins when both are sent). Errors are
//! JSON bodies of the form `{"detail": "..."}`:
//!
//! | Status | When |
//! |--------|------|
//! | 400 | an API key is missing from the server's configuration |
//! | 422 | neither `file` nor `pdf_url` was sent, or the form is malformed |
//! | 500 | any pipeline stage failed; the run directory is removed |

use crate::config::ProcessConfig;
use crate::error::Pdf2JsonError;
use crate::output::Author;
use crate::pipeline::input;
use crate::process::{process_in_dir, read_json};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Largest accepted request body.
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Successful `/process` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub run_dir: PathBuf,
    pub pdf_path: PathBuf,
    pub markdown_file: PathBuf,
    pub json_file: PathBuf,
    pub images_dir: PathBuf,
    pub authors: Vec<Author>,
    pub doi: Option<String>,
    /// The converted JSON file as stored on disk, `{}` if it can't be read.
    pub paper_data: serde_json::Value,
    /// Leading characters of the Markdown file, `null` if it can't be read.
    pub markdown_preview: Option<String>,
}

/// Error response with a FastAPI-style `detail` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<Pdf2JsonError> for ApiError {
    fn from(e: Pdf2JsonError) -> Self {
        let status = StatusCode::from_u16(e.status_hint()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}

/// Shared state: the configuration every request runs with.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProcessConfig>,
}

/// Build the router with permissive CORS.
pub fn router(config: ProcessConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
    };
    Router::new()
        .route(
            "/process",
            post(process_endpoint).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `host:port` and serve until the process is stopped.
pub async fn serve(config: ProcessConfig, host: &str, port: u16) -> Result<(), Pdf2JsonError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Pdf2JsonError::Internal(format!("bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router(config))
        .await
        .map_err(|e| Pdf2JsonError::Internal(format!("server: {e}")))
}

/// A PDF received in the form.
struct Upload {
    filename: String,
    bytes: axum::body::Bytes,
}

#[derive(Default)]
struct ProcessForm {
    pdf_url: Option<String>,
    file: Option<Upload>,
}

async fn read_form(mut multipart: Multipart) -> Result<ProcessForm, ApiError> {
    let mut form = ProcessForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("pdf_url") => {
                let url = field.text().await.map_err(|e| {
                    ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("Bad pdf_url: {e}"))
                })?;
                form.pdf_url = Some(url).filter(|u| !u.trim().is_empty());
            }
            Some("file") => {
                let filename = upload_name(field.file_name());
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("Failed to read file: {e}"))
                })?;
                if !bytes.is_empty() {
                    form.file = Some(Upload { filename, bytes });
                }
            }
            other => warn!("Ignoring unexpected form field {:?}", other),
        }
    }
    Ok(form)
}

/// Basename of the client's filename, `uploaded.pdf` when absent.
fn upload_name(client_name: Option<&str>) -> String {
    client_name
        .and_then(|n| Path::new(n).file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("uploaded.pdf")
        .to_string()
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

async fn process_endpoint(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, ApiError> {
    let config = state.config.as_ref();
    config.ensure_api_keys()?;

    let form = read_form(multipart).await?;
    if form.file.is_none() && form.pdf_url.is_none() {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Provide either 'file' upload or 'pdf_url'.",
        ));
    }

    let run_dir = input::create_work_dir(&config.work_root())?;
    let outcome = run_request(form, &run_dir, config).await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!("Processing failed: {}", e);
            if let Err(rm) = tokio::fs::remove_dir_all(&run_dir).await {
                warn!("Could not remove {}: {}", run_dir.display(), rm);
            }
            return Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let paper_data = match read_json(&result.json_file).await {
        Ok(paper) => serde_json::to_value(&paper).unwrap_or_else(|_| serde_json::json!({})),
        Err(e) => {
            warn!("Could not read back {}: {}", result.json_file.display(), e);
            serde_json::json!({})
        }
    };
    let markdown_preview = tokio::fs::read_to_string(&result.markdown_file)
        .await
        .ok()
        .map(|md| truncate_chars(&md, config.markdown_preview_chars));

    Ok(Json(ProcessResponse {
        run_dir: result.run_dir,
        pdf_path: result.pdf_path,
        markdown_file: result.markdown_file,
        json_file: result.json_file,
        images_dir: result.images_dir,
        authors: result.authors,
        doi: result.doi,
        paper_data,
        markdown_preview,
    }))
}

async fn run_request(
    form: ProcessForm,
    run_dir: &Path,
    config: &ProcessConfig,
) -> Result<crate::output::ProcessingResult, Pdf2JsonError> {
    match (form.file, form.pdf_url) {
        (Some(upload), _) => {
            let dest = run_dir.join(&upload.filename);
            tokio::fs::write(&dest, &upload.bytes)
                .await
                .map_err(|e| Pdf2JsonError::io(&dest, e))?;
            info!("Saved upload {} ({} bytes)", dest.display(), upload.bytes.len());
            process_in_dir(&dest.to_string_lossy(), false, run_dir, config).await
        }
        (None, Some(url)) => process_in_dir(&url, true, run_dir, config).await,
        (None, None) => Err(Pdf2JsonError::InvalidInput {
            input: String::new(),
        }),
    }
}
