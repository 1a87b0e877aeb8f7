//! Error types for the pdf2json library.
//!
//! Only the orchestration stages can fail. The Markdown → section tree
//! builder in [`crate::pipeline::structure`] is total and has no error type.
//!
//! Every fallible stage returns [`Pdf2JsonError`]. The CLI wraps it with
//! `anyhow` context; the HTTP service maps it to a status code via
//! [`Pdf2JsonError::status_hint`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2json library.
#[derive(Debug, Error)]
pub enum Pdf2JsonError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// One or more API keys are not set.
    #[error("Missing required environment variables: {}", vars.join(", "))]
    MissingEnv { vars: Vec<String> },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File does not exist: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The input string is neither an HTTP(S) URL nor a usable path.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Parsing service errors ────────────────────────────────────────────
    /// The document-parsing service rejected the upload or the job failed.
    #[error("Document parsing failed: {reason}")]
    ParseFailed { reason: String },

    /// The parse job did not finish within the configured time.
    #[error("Document parsing job '{job_id}' did not finish within {secs}s")]
    ParseTimeout { job_id: String, secs: u64 },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("PDF '{}' could not be opened: {detail}", path.display())]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Place libpdfium next to the binary, install it system-wide, \
or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    PdfiumBindingFailed(String),

    /// An embedded image could not be decoded or written.
    #[error("Failed to save image {index} of page {page}: {detail}")]
    ImageSaveFailed {
        page: usize,
        index: usize,
        detail: String,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The author-extraction provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The chat-completion call failed.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing a run artefact failed.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialisation of the paper document failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2JsonError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status code the service should answer with for this error.
    ///
    /// Missing keys are the caller's deployment problem (400); everything
    /// else is a processing failure (500).
    pub fn status_hint(&self) -> u16 {
        match self {
            Self::MissingEnv { .. } => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_lists_every_variable() {
        let e = Pdf2JsonError::MissingEnv {
            vars: vec!["LLAMA_CLOUD_API_KEY".into(), "OPENROUTER_API_KEY".into()],
        };
        assert_eq!(
            e.to_string(),
            "Missing required environment variables: LLAMA_CLOUD_API_KEY, OPENROUTER_API_KEY"
        );
        assert_eq!(e.status_hint(), 400);
    }

    #[test]
    fn file_not_found_display() {
        let e = Pdf2JsonError::FileNotFound {
            path: PathBuf::from("/tmp/nope.pdf"),
        };
        assert_eq!(e.to_string(), "File does not exist: /tmp/nope.pdf");
        assert_eq!(e.status_hint(), 500);
    }

    #[test]
    fn parse_timeout_display() {
        let e = Pdf2JsonError::ParseTimeout {
            job_id: "abc".into(),
            secs: 600,
        };
        let msg = e.to_string();
        assert!(msg.contains("abc"), "got: {msg}");
        assert!(msg.contains("600s"), "got: {msg}");
    }

    #[test]
    fn image_save_display() {
        let e = Pdf2JsonError::ImageSaveFailed {
            page: 2,
            index: 3,
            detail: "bad filter".into(),
        };
        assert!(e.to_string().contains("image 3 of page 2"));
    }
}
