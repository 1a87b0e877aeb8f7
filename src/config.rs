//! Configuration types for the PDF → paper JSON pipeline.
//!
//! All pipeline behaviour is controlled through [`ProcessConfig`], built via
//! its [`ProcessConfigBuilder`] or read from the environment with
//! [`ProcessConfig::from_env`]. The two API keys are required for a run;
//! [`ProcessConfig::ensure_api_keys`] reports every missing one at once.

use crate::error::Pdf2JsonError;
use crate::progress::ProgressCallback;
use crate::prompts::PARSE_INSTRUCTIONS;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable holding the LlamaParse (LlamaCloud) API key.
pub const LLAMA_CLOUD_API_KEY: &str = "LLAMA_CLOUD_API_KEY";
/// Environment variable holding the OpenRouter API key.
pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";

/// Default LlamaCloud endpoint.
pub const DEFAULT_PARSE_BASE_URL: &str = "https://api.cloud.llamaindex.ai";
/// Default model for author extraction.
pub const DEFAULT_AUTHORS_MODEL: &str = "deepseek/deepseek-r1-0528:free";

/// Load a `.env` file from the working directory, if there is one.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Configuration for one pipeline run (or for every request of the server).
///
/// # Example
/// ```rust
/// use pdf2json::ProcessConfig;
///
/// let config = ProcessConfig::builder()
///     .llama_api_key("llx-...")
///     .openrouter_api_key("sk-or-...")
///     .work_dir("/tmp/runs")
///     .build()
///     .unwrap();
/// assert!(config.ensure_api_keys().is_ok());
/// ```
#[derive(Clone)]
pub struct ProcessConfig {
    /// Base directory for run folders. Default: `./runs`.
    pub work_dir: Option<PathBuf>,

    /// LlamaParse API key.
    pub llama_api_key: Option<String>,

    /// OpenRouter API key.
    ///
    /// The default author provider is created through
    /// `edgequake_llm::ProviderFactory`, which reads `OPENROUTER_API_KEY`
    /// from the process environment itself; this field is what the
    /// pre-flight check looks at.
    pub openrouter_api_key: Option<String>,

    /// Options forwarded to the parsing service.
    pub parse: ParseOptions,

    /// Delay between job-status polls in milliseconds. Default: 2000.
    pub poll_interval_ms: u64,

    /// Give up on a parse job after this many seconds. Default: 900.
    pub parse_timeout_secs: u64,

    /// Provider name for author extraction. Default: `"openrouter"`.
    pub authors_provider: String,

    /// Model for author extraction. Default: [`DEFAULT_AUTHORS_MODEL`].
    pub authors_model: String,

    /// Pre-constructed LLM provider. Takes precedence over `authors_provider`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Timeout for a single HTTP call to the parsing service or the LLM in
    /// seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Number of Markdown characters echoed back by the HTTP service.
    /// Default: 20 000.
    pub markdown_preview_chars: usize,

    /// Optional per-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            llama_api_key: None,
            openrouter_api_key: None,
            parse: ParseOptions::default(),
            poll_interval_ms: 2000,
            parse_timeout_secs: 900,
            authors_provider: "openrouter".to_string(),
            authors_model: DEFAULT_AUTHORS_MODEL.to_string(),
            provider: None,
            download_timeout_secs: 60,
            api_timeout_secs: 120,
            markdown_preview_chars: 20_000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProcessConfig")
            .field("work_dir", &self.work_dir)
            .field("llama_api_key", &redact(&self.llama_api_key))
            .field("openrouter_api_key", &redact(&self.openrouter_api_key))
            .field("parse", &self.parse)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("parse_timeout_secs", &self.parse_timeout_secs)
            .field("authors_provider", &self.authors_provider)
            .field("authors_model", &self.authors_model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("markdown_preview_chars", &self.markdown_preview_chars)
            .finish()
    }
}

impl ProcessConfig {
    /// Create a new builder for `ProcessConfig`.
    pub fn builder() -> ProcessConfigBuilder {
        ProcessConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read configuration from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `LLAMA_CLOUD_API_KEY` | `llama_api_key` |
    /// | `OPENROUTER_API_KEY` | `openrouter_api_key` |
    /// | `PDF2JSON_WORK_DIR` | `work_dir` |
    /// | `LLAMA_CLOUD_BASE_URL` | `parse.base_url` |
    /// | `PDF2JSON_AUTHORS_MODEL` | `authors_model` |
    /// | `PDF2JSON_POLL_INTERVAL_MS` | `poll_interval_ms` |
    /// | `PDF2JSON_PARSE_TIMEOUT` | `parse_timeout_secs` |
    ///
    /// Missing keys are not an error here; call
    /// [`ensure_api_keys`](Self::ensure_api_keys) before running.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut parse = ParseOptions::default();
        if let Some(url) = env_opt("LLAMA_CLOUD_BASE_URL") {
            parse.base_url = url;
        }

        Self {
            work_dir: env_opt("PDF2JSON_WORK_DIR").map(PathBuf::from),
            llama_api_key: env_opt(LLAMA_CLOUD_API_KEY),
            openrouter_api_key: env_opt(OPENROUTER_API_KEY),
            parse,
            poll_interval_ms: env_u64("PDF2JSON_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            parse_timeout_secs: env_u64("PDF2JSON_PARSE_TIMEOUT", defaults.parse_timeout_secs),
            authors_model: env_opt("PDF2JSON_AUTHORS_MODEL").unwrap_or(defaults.authors_model),
            ..Self::default()
        }
    }

    /// Fail with every missing API key listed, in a fixed order.
    pub fn ensure_api_keys(&self) -> Result<(), Pdf2JsonError> {
        let missing: Vec<String> = [
            (LLAMA_CLOUD_API_KEY, &self.llama_api_key),
            (OPENROUTER_API_KEY, &self.openrouter_api_key),
        ]
        .into_iter()
        .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
        .map(|(k, _)| k.to_string())
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Pdf2JsonError::MissingEnv { vars: missing })
        }
    }

    /// Base directory for run folders, `./runs` unless configured.
    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| PathBuf::from("runs"))
    }
}

/// Builder for [`ProcessConfig`].
#[derive(Debug)]
pub struct ProcessConfigBuilder {
    config: ProcessConfig,
}

impl ProcessConfigBuilder {
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn llama_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.llama_api_key = Some(key.into());
        self
    }

    pub fn openrouter_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.openrouter_api_key = Some(key.into());
        self
    }

    pub fn parse_options(mut self, options: ParseOptions) -> Self {
        self.config.parse = options;
        self
    }

    pub fn parse_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.parse.base_url = url.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn parse_timeout_secs(mut self, secs: u64) -> Self {
        self.config.parse_timeout_secs = secs;
        self
    }

    pub fn authors_provider(mut self, name: impl Into<String>) -> Self {
        self.config.authors_provider = name.into();
        self
    }

    pub fn authors_model(mut self, model: impl Into<String>) -> Self {
        self.config.authors_model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn markdown_preview_chars(mut self, n: usize) -> Self {
        self.config.markdown_preview_chars = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessConfig, Pdf2JsonError> {
        let c = &self.config;
        if c.poll_interval_ms == 0 {
            return Err(Pdf2JsonError::InvalidConfig(
                "Poll interval must be ≥ 1 ms".into(),
            ));
        }
        if c.parse_timeout_secs == 0 || c.download_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(Pdf2JsonError::InvalidConfig(
                "Timeouts must be ≥ 1 s".into(),
            ));
        }
        if !c.parse.base_url.starts_with("http://") && !c.parse.base_url.starts_with("https://") {
            return Err(Pdf2JsonError::InvalidConfig(format!(
                "Parse service URL must be http(s), got '{}'",
                c.parse.base_url
            )));
        }
        if c.authors_model.trim().is_empty() {
            return Err(Pdf2JsonError::InvalidConfig(
                "Authors model must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Parse options ────────────────────────────────────────────────────────

/// Settings sent to LlamaParse with every upload.
///
/// The defaults tune the service for academic papers: two-column layouts are
/// merged, running headers/footers dropped, and tables kept as HTML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Service root, without the `/api/v1/...` suffix.
    pub base_url: String,
    /// Model the parse agent runs with.
    pub model: String,
    /// LlamaParse parse mode.
    pub parse_mode: String,
    /// Separator placed between pages in the Markdown result.
    pub page_separator: String,
    /// Extra instructions appended to the service's own system prompt.
    pub system_prompt_append: String,
    pub extract_charts: bool,
    pub high_res_ocr: bool,
    pub hide_headers: bool,
    pub hide_footers: bool,
    pub two_column_layout: bool,
    pub aggressive_title_filter: bool,
    pub deduplicate_repeated_lines: bool,
    pub output_tables_as_html: bool,
    pub adaptive_long_table: bool,
    pub outlined_table_extraction: bool,
    pub merge_tables_across_pages_in_markdown: bool,
    pub spreadsheet_extract_sub_tables: bool,
    pub save_images: bool,
    pub fast_mode: bool,
    pub skip_diagonal_text: bool,
    pub preserve_layout_alignment_across_pages: bool,
    pub preserve_very_small_text: bool,
    pub do_not_unroll_columns: bool,
    pub extract_layout: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PARSE_BASE_URL.to_string(),
            model: "openai-gpt-4-1-mini".to_string(),
            parse_mode: "parse_page_with_agent".to_string(),
            page_separator: "\n\n---\n\n".to_string(),
            system_prompt_append: PARSE_INSTRUCTIONS.to_string(),
            extract_charts: true,
            high_res_ocr: true,
            hide_headers: true,
            hide_footers: true,
            two_column_layout: true,
            aggressive_title_filter: true,
            deduplicate_repeated_lines: true,
            output_tables_as_html: true,
            adaptive_long_table: true,
            outlined_table_extraction: true,
            merge_tables_across_pages_in_markdown: true,
            spreadsheet_extract_sub_tables: true,
            save_images: true,
            fast_mode: false,
            skip_diagonal_text: false,
            preserve_layout_alignment_across_pages: false,
            preserve_very_small_text: false,
            do_not_unroll_columns: false,
            extract_layout: false,
        }
    }
}

impl ParseOptions {
    /// Multipart text fields for the upload request, in a stable order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let flag = |b: bool| b.to_string();
        vec![
            ("result_type", "markdown".to_string()),
            ("model", self.model.clone()),
            ("parse_mode", self.parse_mode.clone()),
            ("page_separator", self.page_separator.clone()),
            ("system_prompt_append", self.system_prompt_append.clone()),
            ("cleaning_pass", "playground_default".to_string()),
            ("extract_charts", flag(self.extract_charts)),
            ("high_res_ocr", flag(self.high_res_ocr)),
            ("hide_headers", flag(self.hide_headers)),
            ("hide_footers", flag(self.hide_footers)),
            ("two_column_layout", flag(self.two_column_layout)),
            ("aggressive_title_filter", flag(self.aggressive_title_filter)),
            ("deduplicate_repeated_lines", flag(self.deduplicate_repeated_lines)),
            ("output_tables_as_HTML", flag(self.output_tables_as_html)),
            ("adaptive_long_table", flag(self.adaptive_long_table)),
            ("outlined_table_extraction", flag(self.outlined_table_extraction)),
            (
                "merge_tables_across_pages_in_markdown",
                flag(self.merge_tables_across_pages_in_markdown),
            ),
            (
                "spreadsheet_extract_sub_tables",
                flag(self.spreadsheet_extract_sub_tables),
            ),
            ("save_images", flag(self.save_images)),
            ("output_pdf_of_document", "false".to_string()),
            ("fast_mode", flag(self.fast_mode)),
            ("skip_diagonal_text", flag(self.skip_diagonal_text)),
            (
                "preserve_layout_alignment_across_pages",
                flag(self.preserve_layout_alignment_across_pages),
            ),
            ("preserve_very_small_text", flag(self.preserve_very_small_text)),
            ("do_not_unroll_columns", flag(self.do_not_unroll_columns)),
            ("extract_layout", flag(self.extract_layout)),
        ]
    }
}
