//! Pipeline stages for PDF-to-JSON processing.
//!
//! Each submodule implements one step and can be used on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ structure ──▶ extract ──▶ authors
//! (URL/path) (LlamaParse) (tree)   (pdfium)    (LLM)
//! ```
//!
//! 1. [`input`]     copy or download the PDF into the run directory
//! 2. [`parse`]     upload to LlamaParse and poll until Markdown is ready
//! 3. [`structure`] turn Markdown headings into a nested section tree; pure
//! 4. [`extract`]   save embedded images and find the DOI; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 5. [`authors`]   ask an LLM for the author list

pub mod authors;
pub mod extract;
pub mod input;
pub mod parse;
pub mod structure;
