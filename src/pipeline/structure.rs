//! Markdown → nested section tree.
//!
//! The parsing service hands back one flat Markdown string. This stage walks
//! it line by line and nests sections by heading level, so downstream
//! consumers (and the author-extraction prompt) see the paper's outline
//! rather than a wall of text.
//!
//! ## Nesting rule
//!
//! A heading of level `L` becomes a child of the nearest open heading whose
//! level is strictly less than `L`, or of the root when there is none. Levels
//! need not be contiguous: `#### Deep` directly under `# Top` is attached to
//! `Top` as-is. The first level-1 heading is the document title and never
//! becomes a section; any later level-1 heading is an ordinary top-level
//! section.
//!
//! ## Text
//!
//! Every non-heading line (blank ones included) is buffered and attached to
//! the section that is open when the next heading, or end of input, arrives.
//! A buffered block is joined with `\n` and trimmed once, so internal blank
//! lines survive while leading/trailing ones do not. Successive blocks for the
//! same section are joined with `\n`.
//!
//! The builder is a pure function of its input: it never fails and keeps no
//! state between calls.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#+)\s+(.*)").unwrap());

/// Every line boundary: `\r\n` as one break, then each single-character
/// separator (LF, CR, VT, FF, FS, GS, RS, NEL, LS, PS).
static RE_LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new("\r\n|[\n\r\x0B\x0C\x1C\x1D\x1E\u{85}\u{2028}\u{2029}]").unwrap()
});

/// Root of a parsed document.
///
/// Serialises as `{"title": …, "sections": [...]}` with `text` appended only
/// when body text appeared before the first section. The shape is a plain
/// JSON object so collaborators can merge extra keys (`doi`, `images`,
/// `authors`) next to it; see [`crate::output::PaperData`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTree {
    /// Text of the first level-1 heading, if any.
    pub title: Option<String>,

    /// Top-level sections in document order.
    #[serde(default)]
    pub sections: Vec<Section>,

    /// Body text that is not inside any section (e.g. an abstract directly
    /// under the title).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One heading and everything beneath it up to the next same-or-shallower
/// heading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading text, trimmed, without the leading `#`s.
    pub heading: String,

    /// Body text belonging directly to this section, not to a child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Child sections in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Section>,
}

impl Section {
    fn new(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            ..Self::default()
        }
    }

    /// Number of sections in this subtree, excluding `self`.
    pub fn descendant_count(&self) -> usize {
        self.sections
            .iter()
            .map(|s| 1 + s.descendant_count())
            .sum()
    }
}

impl DocumentTree {
    /// Total number of sections at every depth.
    pub fn section_count(&self) -> usize {
        self.sections
            .iter()
            .map(|s| 1 + s.descendant_count())
            .sum()
    }

    /// `true` when the document had neither a title, text, nor sections.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.text.is_none() && self.sections.is_empty()
    }
}

/// Position of an open container: the chain of child indices from the root.
/// The root itself is the empty path.
type NodePath = Vec<usize>;

/// Build the section tree for `markdown` in a single pass.
///
/// Lines are split by [`split_lines`]. A line is a heading when it starts
/// with one or more `#` followed by whitespace; `#NoSpace` is body text.
pub fn build(markdown: &str) -> DocumentTree {
    let mut root = DocumentTree::default();
    // (level, path) for every open container; the root sits at level 0 and is
    // never popped because heading levels start at 1.
    let mut stack: Vec<(usize, NodePath)> = vec![(0, NodePath::new())];
    let mut pending: Vec<&str> = Vec::new();

    for line in split_lines(markdown) {
        let Some(caps) = RE_HEADING.captures(line) else {
            pending.push(line);
            continue;
        };

        flush(&mut root, current_path(&stack), &mut pending);

        let level = caps[1].len();
        let heading = caps[2].trim();

        if level == 1 && root.title.is_none() {
            root.title = Some(heading.to_string());
            continue;
        }

        while matches!(stack.last(), Some((top, _)) if *top >= level) {
            stack.pop();
        }

        let mut path = current_path(&stack).to_vec();
        let (_, siblings) = slots(&mut root, &path);
        siblings.push(Section::new(heading));
        path.push(siblings.len() - 1);
        stack.push((level, path));
    }

    flush(&mut root, current_path(&stack), &mut pending);

    debug!(
        "Built document tree: title={:?}, {} sections",
        root.title,
        root.section_count()
    );
    root
}

/// Split `text` into lines on every Unicode line boundary.
///
/// Besides `\n` and `\r\n` this breaks on a bare `\r`, vertical tab, form
/// feed (page breaks in extracted PDF text), the C1 `NEL`, and the Unicode
/// line and paragraph separators. A trailing separator does not start an
/// extra empty line, and empty input has no lines.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = RE_LINE_BREAK.split(text).collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

fn current_path(stack: &[(usize, NodePath)]) -> &[usize] {
    stack.last().map(|(_, path)| path.as_slice()).unwrap_or(&[])
}

/// Borrow the `text` and `sections` slots of the container at `path`.
fn slots<'a>(
    root: &'a mut DocumentTree,
    path: &[usize],
) -> (&'a mut Option<String>, &'a mut Vec<Section>) {
    let Some((first, rest)) = path.split_first() else {
        return (&mut root.text, &mut root.sections);
    };
    let mut section = &mut root.sections[*first];
    for &idx in rest {
        section = &mut section.sections[idx];
    }
    (&mut section.text, &mut section.sections)
}

/// Attach the buffered lines to the container at `path` and clear the buffer.
fn flush(root: &mut DocumentTree, path: &[usize], pending: &mut Vec<&str>) {
    if pending.is_empty() {
        return;
    }
    let block = pending.join("\n");
    pending.clear();

    let block = block.trim();
    if block.is_empty() {
        return;
    }

    let (text, _) = slots(root, path);
    *text = Some(match text.take() {
        Some(mut existing) => {
            existing.push('\n');
            existing.push_str(block);
            existing
        }
        None => block.to_string(),
    });
}
