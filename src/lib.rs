//! # pdf2json
//!
//! Turn research-paper PDFs into a structured JSON section tree.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF (path or URL)
//!  │
//!  ├─ 1. Resolve    copy or download into a fresh run directory
//!  ├─ 2. Parse      LlamaParse converts the PDF to Markdown
//!  ├─ 3. Structure  headings become nested sections
//!  ├─ 4. Extract    embedded images + DOI via pdfium (spawn_blocking)
//!  └─ 5. Authors    an LLM reads the JSON and lists the authors
//! ```
//!
//! The heart of the crate is [`pipeline::structure::build`], a pure function
//! that needs no network, keys or pdfium:
//!
//! ```rust
//! let tree = pdf2json::build("# Title\n## Intro\nHello\n### Detail\nMore");
//! assert_eq!(tree.title.as_deref(), Some("Title"));
//! assert_eq!(tree.sections[0].heading, "Intro");
//! assert_eq!(tree.sections[0].sections[0].text.as_deref(), Some("More"));
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2json::{load_dotenv, process, ProcessConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // LLAMA_CLOUD_API_KEY and OPENROUTER_API_KEY, from the env or a .env file
//!     load_dotenv();
//!     let config = ProcessConfig::from_env();
//!     let result = process("https://arxiv.org/pdf/1706.03762", &config).await?;
//!     println!("{}", result.json_file.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `pdf2json` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | The `POST /process` HTTP service (axum + tower-http) |
//!
//! ```toml
//! pdf2json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{load_dotenv, ParseOptions, ProcessConfig, ProcessConfigBuilder};
pub use error::Pdf2JsonError;
pub use output::{Author, ExtractedMetadata, ImageRef, PaperData, ProcessingResult};
pub use pipeline::structure::{build, DocumentTree, Section};
pub use process::{process, process_in_dir, process_pdf_input, process_sync, RunLayout};
pub use progress::{NoopProgressCallback, ProcessProgressCallback, ProgressCallback, Stage};
