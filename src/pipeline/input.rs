//! Input resolution: bring the user's PDF into the run directory.
//!
//! Every run gets its own timestamped folder under the work root, and the
//! PDF is copied (local input) or streamed (URL input) into it. All later
//! artefacts are named after that copy, so a run folder is self-contained
//! and can be archived or deleted as a unit.

use crate::error::Pdf2JsonError;
use chrono::Utc;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Filename used when a URL has no usable last path segment.
pub const FALLBACK_PDF_NAME: &str = "downloaded_pdf.pdf";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Create `<root>/<UTC timestamp>` and return its path.
///
/// The timestamp has microsecond resolution (`20240131-142501-123456`), so
/// concurrent requests get distinct folders.
pub fn create_work_dir(root: &Path) -> Result<PathBuf, Pdf2JsonError> {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S-%6f").to_string();
    let dir = root.join(stamp);
    std::fs::create_dir_all(&dir).map_err(|e| Pdf2JsonError::io(&dir, e))?;
    debug!("Created run directory {}", dir.display());
    Ok(dir)
}

/// Derive a local filename from the URL's last path segment.
///
/// The query string and fragment are ignored. Empty segments and segments
/// without a `.` (such as `/download`) fall back to [`FALLBACK_PDF_NAME`].
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    if last.is_empty() || !last.contains('.') || last.chars().all(|c| c == '.') {
        FALLBACK_PDF_NAME.to_string()
    } else {
        last.to_string()
    }
}

/// Resolve `source` into `run_dir` and return the local PDF path.
pub async fn resolve_into(
    source: &str,
    is_url: bool,
    run_dir: &Path,
    download_timeout_secs: u64,
) -> Result<PathBuf, Pdf2JsonError> {
    if is_url {
        download_pdf(source, run_dir, download_timeout_secs).await
    } else {
        copy_local(Path::new(source), run_dir).await
    }
}

/// Copy a local PDF into `run_dir`, keeping its basename.
///
/// A file that already lives in `run_dir` (an HTTP upload, for instance) is
/// used in place.
pub async fn copy_local(src: &Path, run_dir: &Path) -> Result<PathBuf, Pdf2JsonError> {
    if !src.is_file() {
        return Err(Pdf2JsonError::FileNotFound {
            path: src.to_path_buf(),
        });
    }

    let name = src.file_name().ok_or_else(|| Pdf2JsonError::InvalidInput {
        input: src.display().to_string(),
    })?;
    let dest = run_dir.join(name);

    if same_file(src, &dest) {
        debug!("PDF already in run directory: {}", dest.display());
    } else {
        tokio::fs::copy(src, &dest)
            .await
            .map_err(|e| Pdf2JsonError::io(&dest, e))?;
        debug!("Copied {} → {}", src.display(), dest.display());
    }

    check_magic(&dest).await;
    Ok(dest)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Stream a URL into `run_dir`.
pub async fn download_pdf(
    url: &str,
    run_dir: &Path,
    timeout_secs: u64,
) -> Result<PathBuf, Pdf2JsonError> {
    info!("Downloading PDF from: {}", url);

    let download_err = |e: reqwest::Error| {
        if e.is_timeout() {
            Pdf2JsonError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2JsonError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(download_err)?;

    let response = client.get(url).send().await.map_err(download_err)?;

    if !response.status().is_success() {
        return Err(Pdf2JsonError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let dest = run_dir.join(filename_from_url(url));
    let mut file = tokio::fs::File::create(&dest)
        .await
        .map_err(|e| Pdf2JsonError::io(&dest, e))?;

    let mut body = response.bytes_stream();
    let mut written = 0usize;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(download_err)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Pdf2JsonError::io(&dest, e))?;
        written += chunk.len();
    }
    file.flush().await.map_err(|e| Pdf2JsonError::io(&dest, e))?;

    info!("Downloaded {} bytes to: {}", written, dest.display());
    check_magic(&dest).await;
    Ok(dest)
}

/// Warn when a file does not start with `%PDF`; the parsing service accepts
/// other formats, but image extraction will fail on them.
async fn check_magic(path: &Path) {
    if !has_pdf_magic(path).await {
        warn!("{} does not look like a PDF", path.display());
    }
}

/// `true` when the first four bytes of `path` are `%PDF`. Only the header is
/// read.
pub async fn has_pdf_magic(path: &Path) -> bool {
    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut header = [0u8; 4];
    match file.read_exact(&mut header).await {
        Ok(_) => &header == b"%PDF",
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_plain_url() {
        assert_eq!(
            filename_from_url("https://example.com/papers/attention.pdf"),
            "attention.pdf"
        );
    }

    #[test]
    fn filename_ignores_query() {
        assert_eq!(
            filename_from_url("https://example.com/a/paper.pdf?download=1&x=y"),
            "paper.pdf"
        );
    }

    #[test]
    fn filename_falls_back_without_extension() {
        assert_eq!(filename_from_url("https://example.com/download"), FALLBACK_PDF_NAME);
        assert_eq!(filename_from_url("https://example.com/"), FALLBACK_PDF_NAME);
        assert_eq!(filename_from_url("https://example.com/.."), FALLBACK_PDF_NAME);
    }

    #[test]
    fn work_dirs_are_timestamped_and_distinct() {
        let root = tempfile::tempdir().unwrap();
        let a = create_work_dir(root.path()).unwrap();
        let b = create_work_dir(root.path()).unwrap();
        assert!(a.is_dir());
        assert_ne!(a, b);

        let name = a.file_name().unwrap().to_str().unwrap();
        // 20240131-142501-123456
        assert_eq!(name.len(), 22, "got: {name}");
        assert_eq!(name.matches('-').count(), 2);
    }

    #[tokio::test]
    async fn copy_local_into_run_dir() {
        let src_dir = tempfile::tempdir().unwrap();
        let run_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("paper.pdf");
        std::fs::write(&src, b"%PDF-1.7\n").unwrap();

        let dest = copy_local(&src, run_dir.path()).await.unwrap();
        assert_eq!(dest, run_dir.path().join("paper.pdf"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7\n");
    }

    #[tokio::test]
    async fn copy_local_in_place() {
        let run_dir = tempfile::tempdir().unwrap();
        let src = run_dir.path().join("upload.pdf");
        std::fs::write(&src, b"%PDF-1.4 data").unwrap();

        let dest = copy_local(&src, run_dir.path()).await.unwrap();
        assert_eq!(dest, src);
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4 data");
    }

    #[tokio::test]
    async fn copy_local_missing_file() {
        let run_dir = tempfile::tempdir().unwrap();
        let err = copy_local(Path::new("/definitely/not/here.pdf"), run_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2JsonError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn pdf_magic_reads_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("a.pdf");
        let html = dir.path().join("b.pdf");
        let short = dir.path().join("c.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n...").unwrap();
        std::fs::write(&html, b"<!DOCTYPE html>").unwrap();
        std::fs::write(&short, b"%P").unwrap();

        assert!(has_pdf_magic(&pdf).await);
        assert!(!has_pdf_magic(&html).await);
        assert!(!has_pdf_magic(&short).await);
        assert!(!has_pdf_magic(&dir.path().join("missing.pdf")).await);
    }
}
