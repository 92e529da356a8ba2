//! Hyperlink stripping for search-model output.
//!
//! Search-grounded replies are full of citation noise that costs prompt
//! tokens and tempts the classifier into echoing links. This module removes:
//!
//! | Input                                  | Output        |
//! |----------------------------------------|---------------|
//! | `[anchor](https://...)`                | `anchor`      |
//! | `![alt](https://...)`                  | `alt`         |
//! | `[1]`, `[2, 3]`, `[^4]`, `【5】`        | (removed)     |
//! | `【6†source】`, `[citation:7]`          | (removed)     |
//! | `<grok:render ...>...</grok:render>`   | (removed)     |
//! | `https://...`, `www....`               | (removed)     |
//!
//! then collapses the whitespace left behind and rewrites numbered-list
//! markers (`1)`, `1、`, `1.  `) to a single `1. ` form.

use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// Regex Patterns
// ============================================================================

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!?\[([^\[\]]*)\]\([^()\s]*\)").unwrap());
static NUMERIC_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^?\d+(?:\s*[,，]\s*\d+)*\]|【\d+】").unwrap());
static PLATFORM_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<grok:render\b[^>]*>.*?</grok:render>|【\d+†[^】]*】|\[citation:\s*\d+\]",
    )
    .unwrap()
});
static CITE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?cite\b[^>]*>").unwrap());
static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:https?://|www\.)[^\s<>()\[\]]+").unwrap());
static EMPTY_PARENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[(（]\s*[)）]").unwrap());
static HORIZONTAL_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([,.;:!?，。；：！？])").unwrap());
static EXTRA_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\d{1,3})(?:[.)][ \t]+|、[ \t]*)").unwrap());

/// Strip hyperlink-like substrings while keeping link anchor text.
///
/// Applying this to its own output returns the output unchanged.
pub fn strip_links(input: &str) -> String {
    let mut current = input.replace("\r\n", "\n");

    // Runs to a fixpoint. A pass that changes the text either shortens it or
    // canonicalizes a list marker, so the loop terminates.
    loop {
        let next = clean_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }

    current
}

fn clean_pass(input: &str) -> String {
    let text = PLATFORM_CITATION.replace_all(input, "");
    let text = CITE_TAG.replace_all(&text, "");
    let text = unwrap_all(&MARKDOWN_LINK, text.into_owned(), "$1");
    let text = NUMERIC_CITATION.replace_all(&text, "");
    let text = BARE_URL.replace_all(&text, "");
    let text = unwrap_all(&EMPTY_PARENS, text.into_owned(), "");

    collapse_whitespace(&text)
}

/// Replace until nothing matches; nested constructs lose one layer per round.
fn unwrap_all(pattern: &Regex, mut text: String, replacement: &str) -> String {
    while pattern.is_match(&text) {
        text = pattern.replace_all(&text, replacement).into_owned();
    }
    text
}

/// Collapse runs of spaces, trim lines, cap blank lines and normalize list markers.
fn collapse_whitespace(input: &str) -> String {
    let text = HORIZONTAL_SPACE.replace_all(input, " ");
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = lines.join("\n");

    let text = EXTRA_BLANK_LINES.replace_all(&joined, "\n\n");
    let text = NUMBERED_ITEM.replace_all(&text, "$1. ");

    text.trim().to_string()
}
