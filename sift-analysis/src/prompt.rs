//! Prompt composition.
//!
//! The classification system prompt is a static template with two slots:
//!
//! | Placeholder   | Replaced with                                   |
//! |---------------|-------------------------------------------------|
//! | `${SNAPSHOT}` | market context snapshot content                 |
//! | `${PREV}`     | recently reported items, or the literal `none`  |
//!
//! Substitution is a single pass over the template; text inserted into one
//! slot is never rescanned for placeholders.

use regex::{Captures, Regex};
use sift_common::{Error, Result, ResultExt};
use std::path::Path;
use std::sync::LazyLock;

use crate::types::SuppressedItem;

pub const SNAPSHOT_PLACEHOLDER: &str = "${SNAPSHOT}";
pub const PREV_PLACEHOLDER: &str = "${PREV}";

/// Sentinel for an empty suppressed-items block.
pub const NO_SUPPRESSED_ITEMS: &str = "none";

static KNOWN_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(SNAPSHOT|PREV)\}").unwrap());
static ANY_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").unwrap());

/// Default system prompt for the snapshot model.
pub const DEFAULT_SNAPSHOT_PROMPT: &str = "你是一名加密货币与宏观市场分析师。\
You are a crypto and macro market analyst with live web access. Summarize the current market \
state in at most 300 words: prices and 24h % moves of BTC, ETH and other majors, ETF and \
exchange flows, funding and volatility, and the macro or regulatory events moving markets. \
Plain text only, no links, no citations.";

/// Default classification template.
pub const DEFAULT_CLASSIFICATION_TEMPLATE: &str = "\
你是一名市场情报分析师，负责筛选和分类资讯。
You are a market intelligence analyst. Classify the news items the user sends.

## Current market context
${SNAPSHOT}

## Recently reported (do not report these again unless there is material new information)
${PREV}

## Rules
1. Skip items that are duplicates, advertisements, or have no plausible market impact.
2. Invent a short category label for each kept item (for example: 监管, ETF资金, 宏观, 链上数据). \
Reuse labels you have used before when they fit.
3. weight is the market importance from 0 (noise) to 100 (market moving), judged against the \
context above.
4. summary is one neutral paragraph in the language of the item.
5. source_url must be the url given for the item.
6. If nothing qualifies, return an empty list.";

/// Substitute both placeholders. Absent placeholders are a no-op.
pub fn merge(template: &str, snapshot_content: &str, suppressed_text: &str) -> String {
    KNOWN_PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "SNAPSHOT" => snapshot_content.to_string(),
            _ => suppressed_text.to_string(),
        })
        .into_owned()
}

/// Reject templates that reference placeholders other than `${SNAPSHOT}` and `${PREV}`.
pub fn validate_template(template: &str) -> Result<()> {
    let unknown: Vec<&str> = ANY_PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| *name != "SNAPSHOT" && *name != "PREV")
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "template has unknown placeholder(s): {}",
            unknown
                .iter()
                .map(|name| format!("${{{name}}}"))
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

/// Read and validate a template file.
pub fn load_template(path: &Path) -> Result<String> {
    let template = std::fs::read_to_string(path)
        .context(format!("reading template {}", path.display()))?;
    validate_template(&template).context(format!("template {}", path.display()))?;
    Ok(template)
}

/// Render recently reported items as a bullet list, or `none` when there are none.
pub fn format_suppressed(items: &[SuppressedItem]) -> String {
    if items.is_empty() {
        return NO_SUPPRESSED_ITEMS.to_string();
    }

    items
        .iter()
        .map(|item| {
            format!(
                "- [{}] {}",
                item.reported_at.format("%Y-%m-%d %H:%M UTC"),
                item.title.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_merge_both_slots() {
        assert_eq!(
            merge("ctx:${SNAPSHOT} / history:${PREV}", "BTC up 5%", "none"),
            "ctx:BTC up 5% / history:none"
        );
    }

    #[test]
    fn test_merge_missing_slot_is_noop() {
        assert_eq!(merge("only ${PREV}", "ignored", "x"), "only x");
        assert_eq!(merge("plain", "a", "b"), "plain");
    }

    #[test]
    fn test_merge_repeated_slot() {
        assert_eq!(merge("${SNAPSHOT}|${SNAPSHOT}", "s", "p"), "s|s");
    }

    #[test]
    fn test_inserted_text_not_rescanned() {
        assert_eq!(merge("${SNAPSHOT}/${PREV}", "${PREV}", "p"), "${PREV}/p");
    }

    #[test]
    fn test_default_template_resolves() {
        validate_template(DEFAULT_CLASSIFICATION_TEMPLATE).unwrap();
        let merged = merge(DEFAULT_CLASSIFICATION_TEMPLATE, "snap", "none");
        assert!(!merged.contains("${"));
        assert!(merged.contains("snap"));
    }

    #[test]
    fn test_validate_rejects_unknown() {
        let err = validate_template("${SNAPSHOT} ${NEWS}").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("${NEWS}"));
    }

    #[test]
    fn test_load_template() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        let bad = dir.path().join("bad.txt");
        std::fs::write(&good, "ctx ${SNAPSHOT}").unwrap();
        std::fs::write(&bad, "ctx ${CONTEXT}").unwrap();

        assert_eq!(load_template(&good).unwrap(), "ctx ${SNAPSHOT}");
        assert!(load_template(&bad).unwrap_err().is_config());
        assert!(load_template(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_format_suppressed() {
        assert_eq!(format_suppressed(&[]), "none");

        let items = vec![
            SuppressedItem {
                title: " SEC approves spot ETH ETF ".into(),
                reported_at: Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 0).unwrap(),
            },
            SuppressedItem {
                title: "美联储维持利率不变".into(),
                reported_at: Utc.with_ymd_and_hms(2026, 10, 16, 2, 0, 0).unwrap(),
            },
        ];
        assert_eq!(
            format_suppressed(&items),
            "- [2026-10-15 09:30 UTC] SEC approves spot ETH ETF\n- [2026-10-16 02:00 UTC] 美联储维持利率不变"
        );
    }
}
