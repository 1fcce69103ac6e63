// src/utils/html.rs
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RE"));

// Non-greedy so `a<b>b</b>c` loses both tags and keeps the text between them
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.+?>").expect("Failed to compile TAG_RE"));

/// Collapses every whitespace run to a single space and drops the spaces
/// that sit right before `<` or right after `>`.
pub fn compact_html(html: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(html, " ");
    collapsed.replace(" <", "<").replace("> ", ">")
}

/// Compacts the markup, then removes everything that looks like a tag.
/// This is plain text surgery, nothing is validated or balanced.
pub fn strip_tags(html: &str) -> String {
    let compacted = compact_html(html);
    TAG_RE.replace_all(&compacted, "").into_owned()
}
