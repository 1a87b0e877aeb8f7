//! Result types produced by the processing pipeline.
//!
//! [`PaperData`] is what lands in `<stem>-converted.json`: the section tree
//! from [`crate::pipeline::structure`] with the image list, DOI and authors
//! merged in beside it. The tree is flattened so its own keys (`title`,
//! `sections`, `text`) stay at the top level, unchanged, and the extra keys
//! follow them.

use crate::pipeline::structure::DocumentTree;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An embedded image saved from the PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// 1-indexed page the image was found on.
    pub page: usize,
    /// Where the JPEG was written.
    pub path: PathBuf,
}

/// A single author name returned by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Images and DOI pulled straight from the PDF binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub images: Vec<ImageRef>,
    pub doi: Option<String>,
}

/// The merged paper document.
///
/// Serialises as one flat JSON object:
/// `title`, `sections`, `text`?, `doi`?, `images`, `authors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperData {
    #[serde(flatten)]
    pub tree: DocumentTree,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(default)]
    pub images: Vec<ImageRef>,

    #[serde(default)]
    pub authors: Vec<Author>,
}

impl PaperData {
    pub fn new(tree: DocumentTree) -> Self {
        Self {
            tree,
            ..Self::default()
        }
    }

    /// Merge images and DOI. A DOI already present is only replaced by a
    /// newly found one.
    pub fn merge_metadata(&mut self, meta: ExtractedMetadata) {
        if meta.doi.is_some() {
            self.doi = meta.doi;
        }
        self.images = meta.images;
    }
}

/// Everything a single pipeline run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Run directory holding every artefact below.
    pub run_dir: PathBuf,
    /// The PDF copied or downloaded into the run directory.
    pub pdf_path: PathBuf,
    /// `<stem>-processed.md`
    pub markdown_file: PathBuf,
    /// `<stem>-converted.json`
    pub json_file: PathBuf,
    /// `<stem>-images/`
    pub images_dir: PathBuf,
    pub authors: Vec<Author>,
    pub doi: Option<String>,
    /// The final merged document, as written to `json_file`.
    pub paper: PaperData,
    /// Markdown returned by the parsing service.
    #[serde(skip)]
    pub markdown: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structure::build;
    use serde_json::json;

    #[test]
    fn merged_keys_follow_tree_keys() {
        let mut paper = PaperData::new(build("# T\n## A\nbody"));
        paper.merge_metadata(ExtractedMetadata {
            images: vec![ImageRef {
                page: 1,
                path: PathBuf::from("imgs/page_1_img_1.jpg"),
            }],
            doi: Some("10.1000/xyz".into()),
        });
        paper.authors = vec![Author::new("Ada Lovelace")];

        let out = serde_json::to_string(&paper).unwrap();
        let keys: Vec<usize> = ["\"title\"", "\"sections\"", "\"doi\"", "\"images\"", "\"authors\""]
            .iter()
            .map(|k| out.find(k).expect("key present"))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "got: {out}");

        assert_eq!(
            serde_json::to_value(&paper).unwrap(),
            json!({
                "title": "T",
                "sections": [{"heading": "A", "text": "body"}],
                "doi": "10.1000/xyz",
                "images": [{"page": 1, "path": "imgs/page_1_img_1.jpg"}],
                "authors": [{"name": "Ada Lovelace"}]
            })
        );
    }

    #[test]
    fn missing_doi_is_omitted() {
        let mut paper = PaperData::new(build("text"));
        paper.merge_metadata(ExtractedMetadata::default());
        let value = serde_json::to_value(&paper).unwrap();
        assert!(value.get("doi").is_none());
        assert_eq!(value["images"], json!([]));
        assert_eq!(value["text"], json!("text"));
    }

    #[test]
    fn merge_keeps_existing_doi_when_none_found() {
        let mut paper = PaperData::new(DocumentTree::default());
        paper.doi = Some("10.1/a".into());
        paper.merge_metadata(ExtractedMetadata::default());
        assert_eq!(paper.doi.as_deref(), Some("10.1/a"));
    }

    #[test]
    fn paper_round_trips_through_json() {
        let mut paper = PaperData::new(build("# T\nintro\n## A"));
        paper.authors.push(Author::new("Grace Hopper"));
        let json = serde_json::to_string_pretty(&paper).unwrap();
        let back: PaperData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, paper);
    }
}
