//! Recovery of a JSON value from free-form model output.
//!
//! Tried in order, first parse wins:
//!
//! 1. a fenced block labeled `json`
//! 2. any fenced block
//! 3. the whole reply
//!
//! Within each stage the candidate is parsed as-is, then every balanced
//! `{...}` or `[...]` fragment is tried in order (as-is, then with trailing
//! commas and typographic quotes fixed). The first fragment shaped like the
//! expected response wins, so a stray `[1]` citation before the payload is
//! skipped; if none fits, the first fragment that parsed is returned.

use super::SchemaMode;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static LABELED_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*(?i:json)[ \t]*\n?(.*?)```").unwrap());
static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\n?(.*?)```").unwrap());
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Extraction stage that produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LabeledFence,
    AnyFence,
    WholeString,
}

/// Run the ladder. `None` means every stage failed.
pub fn extract(text: &str, mode: SchemaMode) -> Option<(Value, Stage)> {
    let stages: [(Stage, Vec<&str>); 3] = [
        (Stage::LabeledFence, fenced_blocks(&LABELED_FENCE, text)),
        (Stage::AnyFence, fenced_blocks(&ANY_FENCE, text)),
        (Stage::WholeString, vec![text]),
    ];

    stages.into_iter().find_map(|(stage, candidates)| {
        candidates
            .into_iter()
            .find_map(|candidate| parse_candidate(candidate, mode))
            .map(|value| (value, stage))
    })
}

fn fenced_blocks<'a>(pattern: &Regex, text: &'a str) -> Vec<&'a str> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

fn parse_candidate(candidate: &str, mode: SchemaMode) -> Option<Value> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }

    let mut first_parsed = None;
    for fragment in fragments(candidate) {
        let Some(value) = parse_fragment(fragment) else {
            continue;
        };
        if fits(&value, mode) {
            return Some(value);
        }
        first_parsed.get_or_insert(value);
    }
    first_parsed
}

fn parse_fragment(fragment: &str) -> Option<Value> {
    serde_json::from_str(fragment)
        .ok()
        .or_else(|| serde_json::from_str(&fix_json_issues(fragment)).ok())
}

/// Whether a value has the outer shape `mode` expects.
fn fits(value: &Value, mode: SchemaMode) -> bool {
    match (mode, value) {
        (_, Value::Object(_)) => true,
        (SchemaMode::Batch, Value::Array(items)) => items.iter().all(Value::is_object),
        _ => false,
    }
}

/// Balanced objects and arrays in order of their opening delimiter,
/// including ones nested in earlier fragments.
fn fragments(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter_map(|(start, c)| match c {
            '{' => Some((start, '{', '}')),
            '[' => Some((start, '[', ']')),
            _ => None,
        })
        .filter_map(move |(start, open, close)| balanced_fragment(&text[start..], open, close))
}

/// Balanced fragment between matching delimiters, ignoring delimiters inside strings.
fn balanced_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut start = None;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            c if c == open => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            c if c == close && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn fix_json_issues(json: &str) -> String {
    let fixed = json
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    TRAILING_COMMA.replace_all(&fixed, "$1").into_owned()
}
