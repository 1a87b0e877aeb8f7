//! End-to-end pipeline: PDF in, paper JSON out.
//!
//! A run lives in its own directory and leaves these artefacts behind:
//!
//! ```text
//! runs/20240131-142501-123456/
//!  ├─ paper.pdf                 copied or downloaded input
//!  ├─ paper-processed.md        Markdown from the parsing service
//!  ├─ paper-converted.json      section tree + doi + images + authors
//!  └─ paper-images/             page_{p}_img_{n}.jpg
//! ```
//!
//! The JSON file is rewritten after each enrichment stage, so a run that
//! fails late still leaves the earlier stages' output on disk.

use crate::config::ProcessConfig;
use crate::error::Pdf2JsonError;
use crate::output::{Author, ExtractedMetadata, PaperData, ProcessingResult};
use crate::pipeline::{authors, extract, input, parse, structure};
use crate::progress::Stage;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Artefact paths for a PDF inside its run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub run_dir: PathBuf,
    pub pdf_path: PathBuf,
    pub markdown_file: PathBuf,
    pub json_file: PathBuf,
    pub images_dir: PathBuf,
}

impl RunLayout {
    /// Derive the artefact names from the PDF's file stem.
    pub fn for_pdf(pdf_path: &Path) -> Self {
        let run_dir = pdf_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        Self {
            markdown_file: run_dir.join(format!("{stem}-processed.md")),
            json_file: run_dir.join(format!("{stem}-converted.json")),
            images_dir: run_dir.join(format!("{stem}-images")),
            pdf_path: pdf_path.to_path_buf(),
            run_dir,
        }
    }
}

/// Process a local PDF path or a URL in a fresh run directory under the
/// configured work root.
///
/// # Errors
/// - [`Pdf2JsonError::MissingEnv`] before anything touches the disk if an
///   API key is missing
/// - any stage error, unchanged
pub async fn process_pdf_input(
    source: &str,
    is_url: bool,
    config: &ProcessConfig,
) -> Result<ProcessingResult, Pdf2JsonError> {
    config.ensure_api_keys()?;
    let run_dir = input::create_work_dir(&config.work_root())?;
    process_in_dir(source, is_url, &run_dir, config).await
}

/// Like [`process_pdf_input`], with the source kind detected from its prefix.
pub async fn process(source: &str, config: &ProcessConfig) -> Result<ProcessingResult, Pdf2JsonError> {
    process_pdf_input(source, input::is_url(source), config).await
}

/// Blocking wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(source: &str, config: &ProcessConfig) -> Result<ProcessingResult, Pdf2JsonError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2JsonError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(source, config))
}

/// Run every stage with `run_dir` as the run directory.
///
/// The caller owns `run_dir` (it must exist); the HTTP service uses this to
/// place an upload there first and to clean up on failure.
pub async fn process_in_dir(
    source: &str,
    is_url: bool,
    run_dir: &Path,
    config: &ProcessConfig,
) -> Result<ProcessingResult, Pdf2JsonError> {
    config.ensure_api_keys()?;
    info!("Processing {} in {}", source, run_dir.display());

    // ── Step 1: Bring the PDF into the run directory ─────────────────────
    let pdf_path = run_stage(
        config,
        Stage::Resolve,
        input::resolve_into(source, is_url, run_dir, config.download_timeout_secs),
        |p: &PathBuf| p.display().to_string(),
    )
    .await?;
    let layout = RunLayout::for_pdf(&pdf_path);

    // ── Step 2: PDF → Markdown ───────────────────────────────────────────
    let client = parse::LlamaParseClient::new(config)?;
    let markdown = run_stage(
        config,
        Stage::Parse,
        client.parse_file(&layout.pdf_path),
        |md: &String| format!("{} bytes", md.len()),
    )
    .await?;
    write_file(&layout.markdown_file, markdown.as_bytes()).await?;

    // ── Step 3: Markdown → section tree ──────────────────────────────────
    let mut paper = run_stage(
        config,
        Stage::Structure,
        async { Ok::<_, Pdf2JsonError>(PaperData::new(structure::build(&markdown))) },
        |p: &PaperData| format!("{} sections", p.tree.section_count()),
    )
    .await?;
    write_json(&layout.json_file, &paper).await?;

    // ── Step 4: Images + DOI ─────────────────────────────────────────────
    let meta = run_stage(
        config,
        Stage::Extract,
        extract::extract_images_and_doi(&layout.pdf_path, &layout.images_dir),
        |m: &ExtractedMetadata| format!("{} images", m.images.len()),
    )
    .await?;
    paper.merge_metadata(meta);
    write_json(&layout.json_file, &paper).await?;

    // ── Step 5: Authors ──────────────────────────────────────────────────
    let found = run_stage(
        config,
        Stage::Authors,
        authors::extract_authors(&paper, config),
        |a: &Vec<Author>| format!("{} authors", a.len()),
    )
    .await?;
    paper.authors = found;
    write_json(&layout.json_file, &paper).await?;

    info!(
        "Processed {}: {} sections, {} images, {} authors",
        layout.pdf_path.display(),
        paper.tree.section_count(),
        paper.images.len(),
        paper.authors.len()
    );

    Ok(ProcessingResult {
        run_dir: layout.run_dir,
        pdf_path: layout.pdf_path,
        markdown_file: layout.markdown_file,
        json_file: layout.json_file,
        images_dir: layout.images_dir,
        authors: paper.authors.clone(),
        doi: paper.doi.clone(),
        paper,
        markdown,
    })
}

/// Await `fut`, reporting start/complete/error for `stage` to the callback.
async fn run_stage<T, F>(
    config: &ProcessConfig,
    stage: Stage,
    fut: F,
    detail: impl FnOnce(&T) -> String,
) -> Result<T, Pdf2JsonError>
where
    F: Future<Output = Result<T, Pdf2JsonError>>,
{
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(stage);
    }
    match fut.await {
        Ok(value) => {
            if let Some(cb) = cb {
                cb.on_stage_complete(stage, &detail(&value));
            }
            Ok(value)
        }
        Err(e) => {
            warn!("{} failed: {}", stage, e);
            if let Some(cb) = cb {
                cb.on_stage_error(stage, &e.to_string());
            }
            Err(e)
        }
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), Pdf2JsonError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Pdf2JsonError::io(path, e))
}

/// Pretty-print `paper` to `path` via a temp file and rename, so readers
/// never see a half-written document.
pub async fn write_json(path: &Path, paper: &PaperData) -> Result<(), Pdf2JsonError> {
    let json = serde_json::to_string_pretty(paper)?;
    let tmp_path = path.with_extension("json.tmp");
    write_file(&tmp_path, json.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Pdf2JsonError::io(path, e))
}

/// Read a paper document back from disk.
pub async fn read_json(path: &Path) -> Result<PaperData, Pdf2JsonError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Pdf2JsonError::io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}
