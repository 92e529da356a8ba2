//! Snapshot quality scoring.
//!
//! The score is the sum of three independently capped components:
//!
//! | Component        | Formula                                   | Cap |
//! |------------------|-------------------------------------------|-----|
//! | Length           | `chars / 500`                             | 0.3 |
//! | Keyword density  | `0.1 × distinct domain keywords matched`  | 0.4 |
//! | Structure        | `0.1 + 0.1·has_digit + 0.1·has_currency`  | 0.3 |
//!
//! A snapshot is valid when it has at least [`MIN_VALID_CHARS`] characters
//! and mentions at least one domain keyword.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Minimum cleaned length (in characters) for a valid snapshot.
pub const MIN_VALID_CHARS: usize = 50;

/// Bilingual market vocabulary. Matching is case-insensitive and each entry
/// counts once no matter how often it appears. ASCII entries must match a
/// whole word ("eth" does not match "something"); CJK entries match anywhere.
pub const DOMAIN_KEYWORDS: &[&str] = &[
    // English
    "bitcoin",
    "btc",
    "ethereum",
    "eth",
    "crypto",
    "market",
    "price",
    "etf",
    "fed",
    "inflation",
    "rate",
    "liquidity",
    "volatility",
    "funding",
    "regulation",
    "sec",
    "stablecoin",
    "rally",
    "selloff",
    // Chinese
    "比特币",
    "以太坊",
    "加密",
    "市场",
    "价格",
    "美联储",
    "通胀",
    "利率",
    "流动性",
    "波动",
    "资金",
    "监管",
    "稳定币",
    "上涨",
    "下跌",
    "行情",
];

/// Characters that mark prices, percentages and quotes.
const DOMAIN_PUNCTUATION: &[char] = &['%', '$', '¥', '￥', '€', '％'];

const LENGTH_CAP: f64 = 0.3;
const LENGTH_SCALE: f64 = 500.0;
const KEYWORD_CAP: f64 = 0.4;
const KEYWORD_STEP: f64 = 0.1;
const STRUCTURE_BASE: f64 = 0.1;
const STRUCTURE_STEP: f64 = 0.1;

/// ASCII alphanumeric runs. CJK characters end a run, so "BTC报" yields "btc".
static ASCII_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9]+").unwrap());

/// Number of distinct domain keywords present in `content`.
pub fn keyword_count(content: &str) -> usize {
    let lowered = content.to_lowercase();
    let words: HashSet<&str> = ASCII_WORD.find_iter(&lowered).map(|m| m.as_str()).collect();
    DOMAIN_KEYWORDS
        .iter()
        .filter(|keyword| {
            if keyword.is_ascii() {
                words.contains(*keyword)
            } else {
                lowered.contains(*keyword)
            }
        })
        .count()
}

/// Quality score in `[0, 1]`.
pub fn score(content: &str) -> f64 {
    let length = (content.chars().count() as f64 / LENGTH_SCALE).min(LENGTH_CAP);
    let keywords = (KEYWORD_STEP * keyword_count(content) as f64).min(KEYWORD_CAP);

    let has_digit = content.chars().any(|c| c.is_ascii_digit());
    let has_punct = content.chars().any(|c| DOMAIN_PUNCTUATION.contains(&c));
    let structure = STRUCTURE_BASE
        + if has_digit { STRUCTURE_STEP } else { 0.0 }
        + if has_punct { STRUCTURE_STEP } else { 0.0 };

    (length + keywords + structure).clamp(0.0, 1.0)
}

/// Whether cleaned content is usable as grounding context.
pub fn is_valid(content: &str) -> bool {
    content.chars().count() >= MIN_VALID_CHARS && keyword_count(content) >= 1
}

/// Score and validity computed together.
pub fn assess(content: &str) -> (f64, bool) {
    (score(content), is_valid(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_content() {
        assert!((score("") - 0.1).abs() < 1e-9);
        assert!(!is_valid(""));
    }

    #[test]
    fn test_components_cap() {
        let long = format!("BTC ETH 比特币 以太坊 市场 价格 5% {}", "x".repeat(2000));
        assert!((score(&long) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_counted_once() {
        assert_eq!(keyword_count("BTC btc Btc"), 1);
        assert_eq!(keyword_count("比特币 and bitcoin"), 2);
    }

    #[test]
    fn test_validity_boundary() {
        let base = "BTC ";
        let just_short = format!("{base}{}", "a".repeat(MIN_VALID_CHARS - base.len() - 1));
        let exact = format!("{base}{}", "a".repeat(MIN_VALID_CHARS - base.len()));
        assert!(!is_valid(&just_short));
        assert!(is_valid(&exact));

        let no_keyword = "z".repeat(200);
        assert!(!is_valid(&no_keyword));
    }

    #[test]
    fn test_ascii_keywords_match_whole_words() {
        let refusal = "Sorry, something went wrong on our side. Please try again in a second.";
        assert_eq!(keyword_count(refusal), 0);
        assert!(!is_valid(refusal));

        assert_eq!(keyword_count("the request was refused to generate a reply"), 0);
        assert_eq!(keyword_count("比特币(BTC)报 ETH上涨"), 4);
        assert_eq!(keyword_count("ETF-flows, Fed."), 2);
    }

    #[test]
    fn test_example_score() {
        // 9 chars, one keyword (btc), digit and percent sign
        let s = score("BTC up 5%");
        let expected = 9.0 / 500.0 + 0.1 + 0.3;
        assert!((s - expected).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_score_in_unit_interval(content in ".{0,800}") {
            let s = score(&content);
            prop_assert!((0.0..=1.0).contains(&s));
        }

        #[test]
        fn prop_score_monotonic_in_length(content in "[a-z0-9 ]{0,400}", extra in "[a-z ]{0,400}") {
            // appending a separate word never lowers the score
            let longer = format!("{content} {extra}");
            prop_assert!(score(&longer) >= score(&content));
        }

        #[test]
        fn prop_score_monotonic_in_keywords(
            content in "[a-z ]{0,200}",
            idx in 0..DOMAIN_KEYWORDS.len(),
        ) {
            let with_keyword = format!("{content} {}", DOMAIN_KEYWORDS[idx]);
            prop_assert!(keyword_count(&with_keyword) >= keyword_count(&content));
            prop_assert!(score(&with_keyword) >= score(&content));
        }

        #[test]
        fn prop_validity_matches_rule(content in ".{0,200}") {
            let expected =
                content.chars().count() >= MIN_VALID_CHARS && keyword_count(&content) >= 1;
            prop_assert_eq!(is_valid(&content), expected);
        }
    }
}
