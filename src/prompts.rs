//! Prompts sent to the parsing service and to the author-extraction LLM.
//!
//! Keeping them together means the wording can be tuned in one place, and
//! tests can inspect them without a network round-trip.

/// Extraction rules appended to LlamaParse's own system prompt.
///
/// Academic PDFs are mostly two-column with running headers, footers and
/// download stamps on every page. Left in, those become bogus headings that
/// wreck the section tree built afterwards.
pub const PARSE_INSTRUCTIONS: &str = r#" Extract the PDF to Markdown. Important extraction rules:
Reconstruct two-column layouts into a single continuous reading order (left column then right).

Do not convert page running headers and footers into document headings, instead delete them. If a short phrase (like a single word or a short phrase) repeats across multiple pages, treat it as a running header/footer and exclude it from the Markdown output.

Remove obvious footer text such as page numbers, "Downloaded from…", "See the Terms and Conditions…", journal name footers, copyright lines, and DOI repeated on each page.

Preserve section headings, bold/italic formatting, lists, tables, images and inline links. Only remove repeated lines that appear on many pages.

Keep tables as Markdown tables. Keep images as ![](path) with alt text.

Do not duplicate content across pages. Join lines that are broken in the middle of sentences.

If you are unsure whether a repeated short phrase is a genuine heading or a running header, prefer to treat it as a running header and skip it (we will post-process later if needed).

Example to ignore as headers/footers (do not treat as headings):

Downloaded from https://...

8503, 2021, 1, Downloaded from ...

Short repeated words like Complexity (if repeated across pages), journal name, or page numbers.

Output: a single Markdown file in correct reading order, with headers/footers removed.
"#;

/// System message for the author-extraction call.
pub const AUTHORS_SYSTEM_PROMPT: &str =
    "You are a data analyst that answers based on provided JSON data.";

/// Final user turn asking for the author list.
pub const AUTHORS_QUESTION: &str =
    "What are the authors listed in this dataset? Give me only their full name";

/// Wrap the pretty-printed paper JSON as the first user turn.
pub fn authors_document_message(paper_json: &str) -> String {
    format!("Here is the JSON document:\n{}", paper_json)
}
