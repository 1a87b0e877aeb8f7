//! Embedded images and DOI, read straight from the PDF via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while decoding. The whole pass runs on tokio's blocking
//! pool so the async workers stay free for the HTTP service.
//!
//! Every image object on every page is written as
//! `page_{page}_img_{n}.jpg` (both 1-indexed). JPEG has no alpha or CMYK
//! channel, so images are converted to RGB first.

use crate::error::Pdf2JsonError;
use crate::output::{ExtractedMetadata, ImageRef};
use image::ImageFormat;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

static RE_DOI: Lazy<Regex> = Lazy::new(|| Regex::new(r"doi:\s*([^\s]+)").unwrap());

/// Find the first `doi: <id>` in `text`. Case-sensitive, as printed on most
/// journal title pages.
pub fn find_doi(text: &str) -> Option<String> {
    RE_DOI.captures(text).map(|caps| caps[1].to_string())
}

/// File name for the `index`-th image (1-indexed) on `page` (1-indexed).
pub fn image_file_name(page: usize, index: usize) -> String {
    format!("page_{page}_img_{index}.jpg")
}

/// Bind to pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the
/// system library path.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2JsonError> {
    let from_env = std::env::var("PDFIUM_LIB_PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .map(|p| Pdfium::bind_to_library(PathBuf::from(p)));

    let bindings = match from_env {
        Some(Ok(bindings)) => Ok(bindings),
        Some(Err(e)) => {
            warn!("PDFIUM_LIB_PATH could not be loaded ({e:?}); trying defaults");
            bind_default()
        }
        None => bind_default(),
    }
    .map_err(|e| Pdf2JsonError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

fn bind_default() -> Result<Box<dyn PdfiumLibraryBindings>, PdfiumError> {
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
}

/// Save every embedded image under `images_dir` and look for a DOI on the
/// first page.
pub async fn extract_images_and_doi(
    pdf_path: &Path,
    images_dir: &Path,
) -> Result<ExtractedMetadata, Pdf2JsonError> {
    let pdf = pdf_path.to_path_buf();
    let out = images_dir.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&pdf, &out))
        .await
        .map_err(|e| Pdf2JsonError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Blocking implementation of [`extract_images_and_doi`].
fn extract_blocking(pdf_path: &Path, images_dir: &Path) -> Result<ExtractedMetadata, Pdf2JsonError> {
    std::fs::create_dir_all(images_dir).map_err(|e| Pdf2JsonError::io(images_dir, e))?;

    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| Pdf2JsonError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let mut meta = ExtractedMetadata::default();

    for (page_idx, page) in document.pages().iter().enumerate() {
        let page_num = page_idx + 1;
        let mut img_num = 0usize;

        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            img_num += 1;

            let path = images_dir.join(image_file_name(page_num, img_num));
            let raw = image_object
                .get_raw_image()
                .map_err(|e| Pdf2JsonError::ImageSaveFailed {
                    page: page_num,
                    index: img_num,
                    detail: format!("{:?}", e),
                })?;
            raw.into_rgb8()
                .save_with_format(&path, ImageFormat::Jpeg)
                .map_err(|e| Pdf2JsonError::ImageSaveFailed {
                    page: page_num,
                    index: img_num,
                    detail: e.to_string(),
                })?;

            debug!("Saved {}", path.display());
            meta.images.push(ImageRef {
                page: page_num,
                path,
            });
        }

        if page_idx == 0 {
            match page.text() {
                Ok(text) => meta.doi = find_doi(&text.all()),
                Err(e) => warn!("No text layer on page 1: {:?}", e),
            }
        }
    }

    info!(
        "Extracted {} images from {} (DOI: {})",
        meta.images.len(),
        pdf_path.display(),
        meta.doi.as_deref().unwrap_or("none")
    );
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_with_space() {
        assert_eq!(
            find_doi("Received 2021\ndoi: 10.1002/cplx.8503 and more"),
            Some("10.1002/cplx.8503".to_string())
        );
    }

    #[test]
    fn doi_without_space_and_first_match_wins() {
        assert_eq!(
            find_doi("doi:10.1/first\ndoi: 10.2/second"),
            Some("10.1/first".to_string())
        );
    }

    #[test]
    fn doi_is_case_sensitive() {
        assert_eq!(find_doi("DOI: 10.1/upper"), None);
        assert_eq!(find_doi("no identifier here"), None);
    }

    #[test]
    fn doi_needs_a_value() {
        assert_eq!(find_doi("doi:   "), None);
    }

    #[test]
    fn image_names_are_one_indexed() {
        assert_eq!(image_file_name(1, 1), "page_1_img_1.jpg");
        assert_eq!(image_file_name(12, 3), "page_12_img_3.jpg");
    }
}
