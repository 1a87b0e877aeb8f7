//! CLI binary for pdf2json.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ProcessConfig`, runs one PDF (or starts the HTTP service) and prints
//! where the artefacts went.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2json::{
    load_dotenv, process_pdf_input, Pdf2JsonError, ProcessConfig, ProcessProgressCallback,
    ProcessingResult, ProgressCallback, Stage,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that shows the running stage and logs one line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<Stage, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, stage: Stage) -> String {
        let secs = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&stage))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        format!("{secs:.1}s")
    }
}

impl ProcessProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(stage, Instant::now());
        }
        self.bar
            .set_prefix(format!("[{}/{}]", stage.position(), Stage::ALL.len()));
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        self.bar.println(format!(
            "  {} {:<28} {:<14} {}",
            green("✓"),
            stage.label(),
            dim(detail),
            dim(&self.elapsed(stage)),
        ));
        if stage == Stage::Authors {
            self.bar.finish_and_clear();
        }
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<28} {}",
            red("✗"),
            stage.label(),
            red(&msg)
        ));
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process a paper from arXiv
  pdf2json --url https://arxiv.org/pdf/1706.03762

  # Process a local file and print the JSON
  pdf2json --path paper.pdf --print-json

  # Keep runs somewhere else
  pdf2json --path paper.pdf --work-dir /data/runs

  # Start the HTTP service
  pdf2json --serve --port 8000
  curl -F file=@paper.pdf http://localhost:8000/process

ENVIRONMENT VARIABLES:
  LLAMA_CLOUD_API_KEY        LlamaParse API key (required)
  OPENROUTER_API_KEY         OpenRouter API key (required)
  LLAMA_CLOUD_BASE_URL       Override the LlamaParse endpoint
  PDF2JSON_WORK_DIR          Root for run directories (default: ./runs)
  PDF2JSON_AUTHORS_MODEL     Model used for author extraction
  PDFIUM_LIB_PATH            Path to libpdfium

  Variables are also read from a .env file in the working directory.
"#;

/// Convert research-paper PDFs into a structured JSON section tree.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2json",
    version,
    about = "Convert research-paper PDFs into a structured JSON section tree",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// HTTP/HTTPS URL of the PDF.
    #[arg(long, conflicts_with = "path", required_unless_present_any = ["path", "serve"])]
    url: Option<String>,

    /// Local PDF file path.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Root directory for run folders.
    #[arg(long, env = "PDF2JSON_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Print the final JSON to stdout.
    #[arg(long)]
    print_json: bool,

    /// Start the HTTP service instead of processing one file.
    #[arg(long, conflicts_with_all = ["url", "path", "print_json"])]
    serve: bool,

    /// Address the HTTP service binds to.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port the HTTP service listens on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Model used for author extraction.
    #[arg(long, env = "PDF2JSON_AUTHORS_MODEL")]
    model: Option<String>,

    /// Disable the progress spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Before parsing, so `.env` values feed the `env = ...` flags too.
    load_dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback in single-file mode; the server logs
    // every request at info.
    let show_progress = !cli.serve && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.serve {
        return match serve(&cli).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{} {:#}", red("Server error:"), e);
                ExitCode::FAILURE
            }
        };
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };
    let config = build_config(&cli, progress);

    if let Err(e) = config.ensure_api_keys() {
        eprintln!("Environment error: {e}");
        return ExitCode::from(1);
    }

    let (source, is_url) = match (&cli.url, &cli.path) {
        (Some(url), _) => (url.clone(), true),
        (None, Some(path)) => (path.to_string_lossy().into_owned(), false),
        (None, None) => {
            eprintln!("Processing failed: provide --url or --path");
            return ExitCode::from(2);
        }
    };

    match process_pdf_input(&source, is_url, &config).await {
        Ok(result) => match print_result(&result, cli.print_json) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Processing failed: {e:#}");
                ExitCode::from(2)
            }
        },
        Err(e @ Pdf2JsonError::MissingEnv { .. }) => {
            eprintln!("Environment error: {e}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("Processing failed: {e}");
            ExitCode::from(2)
        }
    }
}

/// Map CLI args onto the environment-derived config.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> ProcessConfig {
    let mut config = ProcessConfig::from_env();
    if let Some(ref dir) = cli.work_dir {
        config.work_dir = Some(dir.clone());
    }
    if let Some(ref model) = cli.model {
        config.authors_model = model.clone();
    }
    config.progress_callback = progress;
    config
}

async fn serve(cli: &Cli) -> Result<()> {
    let config = build_config(cli, None);
    if let Err(e) = config.ensure_api_keys() {
        // Requests will answer 400 until the keys are provided.
        tracing::warn!("{e}");
    }
    pdf2json::server::serve(config, &cli.host, cli.port)
        .await
        .with_context(|| format!("Failed to serve on {}:{}", cli.host, cli.port))
}

fn print_result(result: &ProcessingResult, print_json: bool) -> Result<()> {
    println!("{}", green("Processing completed."));
    println!("PDF:      {}", result.pdf_path.display());
    println!("Markdown: {}", result.markdown_file.display());
    println!("JSON:     {}", result.json_file.display());
    println!("Images:   {}", result.images_dir.display());
    if let Some(ref doi) = result.doi {
        println!("DOI:      {doi}");
    }
    if !result.authors.is_empty() {
        println!("Authors:");
        for author in &result.authors {
            println!("- {}", author.name);
        }
    }

    if print_json {
        let json =
            serde_json::to_string_pretty(&result.paper).context("Failed to serialise paper JSON")?;
        println!("{json}");
    }
    Ok(())
}
