//! PDF → Markdown through the LlamaParse REST API.
//!
//! LlamaParse is asynchronous: the PDF is uploaded, a job id comes back, and
//! the job is polled until it settles. Only then is the Markdown fetched.
//!
//! ```text
//! POST /api/v1/parsing/upload                 → { id, status }
//! GET  /api/v1/parsing/job/{id}               → { id, status }   (repeat)
//! GET  /api/v1/parsing/job/{id}/result/markdown → { markdown }
//! ```
//!
//! Failed calls are not retried; the pipeline surfaces the first error.

use crate::config::{ParseOptions, ProcessConfig};
use crate::error::Pdf2JsonError;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

/// Job states reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Success,
    PartialSuccess,
    Error,
    #[serde(alias = "CANCELED")]
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// `true` once the job will not change state again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Unknown)
    }

    /// `true` when a Markdown result is available.
    pub fn has_result(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::PartialSuccess)
    }
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    status: JobStatus,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarkdownResult {
    markdown: String,
}

/// Client for a single LlamaParse account.
#[derive(Debug, Clone)]
pub struct LlamaParseClient {
    client: reqwest::Client,
    api_key: String,
    options: ParseOptions,
    poll_interval: Duration,
    timeout_secs: u64,
}

impl LlamaParseClient {
    /// Build a client from the run configuration.
    ///
    /// Fails with [`Pdf2JsonError::MissingEnv`] when no API key is set.
    pub fn new(config: &ProcessConfig) -> Result<Self, Pdf2JsonError> {
        let api_key = config
            .llama_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Pdf2JsonError::MissingEnv {
                vars: vec![crate::config::LLAMA_CLOUD_API_KEY.to_string()],
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| Pdf2JsonError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            options: config.parse.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout_secs: config.parse_timeout_secs,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/parsing/{}", self.options.base_url.trim_end_matches('/'), path)
    }

    /// Upload `pdf_path`, wait for the job and return the Markdown.
    pub async fn parse_file(&self, pdf_path: &Path) -> Result<String, Pdf2JsonError> {
        let job_id = self.upload(pdf_path).await?;
        info!("Parse job {} submitted for {}", job_id, pdf_path.display());
        self.wait_for_job(&job_id).await?;
        let markdown = self.fetch_markdown(&job_id).await?;
        info!("Parse job {} returned {} bytes of Markdown", job_id, markdown.len());
        Ok(markdown)
    }

    async fn upload(&self, pdf_path: &Path) -> Result<String, Pdf2JsonError> {
        let bytes = tokio::fs::read(pdf_path)
            .await
            .map_err(|e| Pdf2JsonError::io(pdf_path, e))?;
        let filename = pdf_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")
            .map_err(|e| Pdf2JsonError::Internal(format!("multipart: {e}")))?;

        let form = self
            .options
            .form_fields()
            .into_iter()
            .fold(reqwest::multipart::Form::new().part("file", part), |form, (k, v)| {
                form.text(k, v)
            });

        let resp = self
            .client
            .post(self.endpoint("upload"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(request_failed)?;

        let job: JobResponse = json_or_error(resp).await?;
        Ok(job.id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobResponse, Pdf2JsonError> {
        let resp = self
            .client
            .get(self.endpoint(&format!("job/{job_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(request_failed)?;
        json_or_error(resp).await
    }

    async fn wait_for_job(&self, job_id: &str) -> Result<(), Pdf2JsonError> {
        let start = Instant::now();
        loop {
            let job = self.job_status(job_id).await?;
            debug!("Parse job {}: {:?}", job_id, job.status);

            if job.status.has_result() {
                return Ok(());
            }
            if job.status.is_terminal() {
                return Err(Pdf2JsonError::ParseFailed {
                    reason: format!(
                        "job {} ended with status {:?}{}",
                        job_id,
                        job.status,
                        job.error_message
                            .map(|m| format!(": {m}"))
                            .unwrap_or_default()
                    ),
                });
            }
            if start.elapsed() >= Duration::from_secs(self.timeout_secs) {
                return Err(Pdf2JsonError::ParseTimeout {
                    job_id: job_id.to_string(),
                    secs: self.timeout_secs,
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn fetch_markdown(&self, job_id: &str) -> Result<String, Pdf2JsonError> {
        let resp = self
            .client
            .get(self.endpoint(&format!("job/{job_id}/result/markdown")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(request_failed)?;
        let result: MarkdownResult = json_or_error(resp).await?;
        Ok(result.markdown)
    }
}

fn request_failed(e: reqwest::Error) -> Pdf2JsonError {
    Pdf2JsonError::ParseFailed {
        reason: e.to_string(),
    }
}

async fn json_or_error<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, Pdf2JsonError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Pdf2JsonError::ParseFailed {
            reason: format!("HTTP {status}: {body}"),
        });
    }
    resp.json().await.map_err(request_failed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn config(base_url: &str) -> ProcessConfig {
        ProcessConfig::builder()
            .llama_api_key("llx-test")
            .parse_base_url(base_url)
            .poll_interval_ms(5)
            .parse_timeout_secs(5)
            .build()
            .unwrap()
    }

    #[test]
    fn status_parsing() {
        let parse = |s: &str| serde_json::from_str::<JobStatus>(&format!("\"{s}\"")).unwrap();
        assert_eq!(parse("PENDING"), JobStatus::Pending);
        assert_eq!(parse("SUCCESS"), JobStatus::Success);
        assert_eq!(parse("PARTIAL_SUCCESS"), JobStatus::PartialSuccess);
        assert_eq!(parse("CANCELED"), JobStatus::Cancelled);
        assert_eq!(parse("SOMETHING_NEW"), JobStatus::Unknown);

        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Error.has_result());
        assert!(JobStatus::PartialSuccess.has_result());
    }

    #[test]
    fn endpoints_tolerate_trailing_slash() {
        let client = LlamaParseClient::new(&config("https://parse.example/")).unwrap();
        assert_eq!(
            client.endpoint("job/42"),
            "https://parse.example/api/v1/parsing/job/42"
        );
    }

    #[test]
    fn missing_key_is_reported() {
        let err = LlamaParseClient::new(&ProcessConfig::default()).unwrap_err();
        assert!(matches!(err, Pdf2JsonError::MissingEnv { .. }));
    }

    #[cfg(feature = "server")]
    pub(crate) mod fake_service {
        use super::*;
        use axum::extract::{Multipart, Path as AxumPath, State};
        use axum::http::{HeaderMap, StatusCode};
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use serde_json::{json, Value};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        #[derive(Clone)]
        struct Fake {
            polls: Arc<AtomicUsize>,
            final_status: &'static str,
        }

        async fn upload(headers: HeaderMap, mut form: Multipart) -> (StatusCode, Json<Value>) {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer llx-test") {
                return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "bad key"})));
            }
            let mut saw_file = false;
            while let Ok(Some(field)) = form.next_field().await {
                if field.name() == Some("file") {
                    saw_file = field.bytes().await.map(|b| b.starts_with(b"%PDF")).unwrap_or(false);
                }
            }
            if !saw_file {
                return (StatusCode::BAD_REQUEST, Json(json!({"detail": "no file"})));
            }
            (StatusCode::OK, Json(json!({"id": "job-1", "status": "PENDING"})))
        }

        async fn job(State(fake): State<Fake>, AxumPath(id): AxumPath<String>) -> Json<Value> {
            let n = fake.polls.fetch_add(1, Ordering::SeqCst);
            let status = if n < 2 { "PENDING" } else { fake.final_status };
            Json(json!({"id": id, "status": status, "error_message": "kaput"}))
        }

        async fn markdown(AxumPath(_id): AxumPath<String>) -> Json<Value> {
            Json(json!({"markdown": "# Paper\n## Intro\nHello", "job_metadata": {}}))
        }

        /// Start an in-process LlamaParse stand-in; returns its base URL and
        /// the poll counter. The Markdown result is `# Paper\n## Intro\nHello`.
        pub(crate) async fn spawn(final_status: &'static str) -> (String, Arc<AtomicUsize>) {
            let polls = Arc::new(AtomicUsize::new(0));
            let app = Router::new()
                .route("/api/v1/parsing/upload", post(upload))
                .route("/api/v1/parsing/job/{id}", get(job))
                .route("/api/v1/parsing/job/{id}/result/markdown", get(markdown))
                .with_state(Fake {
                    polls: Arc::clone(&polls),
                    final_status,
                });
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.ok();
            });
            (format!("http://{addr}"), polls)
        }

        fn pdf_in(dir: &tempfile::TempDir) -> std::path::PathBuf {
            let path = dir.path().join("paper.pdf");
            std::fs::write(&path, b"%PDF-1.7 fake").unwrap();
            path
        }

        #[tokio::test]
        async fn upload_poll_and_fetch() {
            let (base, polls) = spawn("SUCCESS").await;
            let dir = tempfile::tempdir().unwrap();
            let client = LlamaParseClient::new(&config(&base)).unwrap();

            let md = client.parse_file(&pdf_in(&dir)).await.unwrap();
            assert_eq!(md, "# Paper\n## Intro\nHello");
            assert_eq!(polls.load(Ordering::SeqCst), 3);
        }

        #[tokio::test]
        async fn failed_job_surfaces_error_message() {
            let (base, _) = spawn("ERROR").await;
            let dir = tempfile::tempdir().unwrap();
            let client = LlamaParseClient::new(&config(&base)).unwrap();

            let err = client.parse_file(&pdf_in(&dir)).await.unwrap_err();
            let msg = err.to_string();
            assert!(matches!(err, Pdf2JsonError::ParseFailed { .. }));
            assert!(msg.contains("kaput"), "got: {msg}");
        }

        #[tokio::test]
        async fn wrong_key_is_http_error() {
            let (base, _) = spawn("SUCCESS").await;
            let dir = tempfile::tempdir().unwrap();
            let cfg = ProcessConfig::builder()
                .llama_api_key("other")
                .parse_base_url(base)
                .build()
                .unwrap();
            let client = LlamaParseClient::new(&cfg).unwrap();

            let msg = client.parse_file(&pdf_in(&dir)).await.unwrap_err().to_string();
            assert!(msg.contains("401"), "got: {msg}");
        }
    }
}
