//! Field constraints for classification records.
//!
//! Applied to every candidate, whatever strategy produced it:
//!
//! | Field        | Constraint                                  | Light repair                         |
//! |--------------|---------------------------------------------|--------------------------------------|
//! | `time`       | string                                      | trimmed                              |
//! | `category`   | string                                      | trimmed                              |
//! | `weight`     | integer in `[0, 100]`                       | `42.0` and `"42"` accepted as 42     |
//! | `summary`    | non-empty string                            | trimmed                              |
//! | `source_url` | starts with `http://` or `https://`         | trimmed                              |
//!
//! A single failing record rejects the whole response.

use serde_json::{Map, Value};

use super::{Enforced, SchemaMode};
use crate::types::{BatchResult, StructuredResult};

/// Field names, in the order they are described to the model.
pub const FIELDS: [&str; 5] = ["time", "category", "weight", "summary", "source_url"];

pub const MIN_WEIGHT: i64 = 0;
pub const MAX_WEIGHT: i64 = 100;

/// Warning attached to a structurally valid empty batch.
pub const EMPTY_BATCH_WARNING: &str = "results is empty: nothing in this batch warranted inclusion";

/// Outcome of validating one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors joined into one line for logs and error messages.
    pub fn summary(&self) -> String {
        self.errors.join("; ")
    }
}

/// Validate (and lightly repair) a parsed response.
///
/// Returns the typed value only when the report has no errors.
pub fn validate(value: &Value, mode: SchemaMode) -> (Option<Enforced>, ValidationReport) {
    let mut report = ValidationReport::default();

    let enforced = match mode {
        SchemaMode::Single => match value.as_object() {
            Some(object) => repair_record(object, "", &mut report.errors).map(Enforced::Single),
            None => {
                report.errors.push(format!("expected an object, got {}", kind(value)));
                None
            }
        },
        SchemaMode::Batch => validate_batch(value, &mut report).map(Enforced::Batch),
    };

    if report.is_valid() {
        (enforced, report)
    } else {
        (None, report)
    }
}

fn validate_batch(value: &Value, report: &mut ValidationReport) -> Option<BatchResult> {
    // a bare array is accepted in place of {"results": [...]}
    let items = match value {
        Value::Array(items) => items,
        Value::Object(object) => match object.get("results") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                report.errors.push(format!("results: expected an array, got {}", kind(other)));
                return None;
            }
            None => {
                report.errors.push("results: missing".into());
                return None;
            }
        },
        other => {
            report.errors.push(format!("expected an object, got {}", kind(other)));
            return None;
        }
    };

    if items.is_empty() {
        report.warnings.push(EMPTY_BATCH_WARNING.into());
        return Some(BatchResult::default());
    }

    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let path = format!("results[{index}].");
        match item.as_object() {
            Some(object) => {
                if let Some(result) = repair_record(object, &path, &mut report.errors) {
                    results.push(result);
                }
            }
            None => report
                .errors
                .push(format!("results[{index}]: expected an object, got {}", kind(item))),
        }
    }

    report.is_valid().then(|| BatchResult::new(results))
}

fn repair_record(
    object: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
) -> Option<StructuredResult> {
    let before = errors.len();

    let time = string_field(object, "time", path, errors);
    let category = string_field(object, "category", path, errors);
    let summary = string_field(object, "summary", path, errors);
    let source_url = string_field(object, "source_url", path, errors);
    let weight = weight_field(object, path, errors);

    if let Some(summary) = &summary {
        if summary.is_empty() {
            errors.push(format!("{path}summary: must not be empty"));
        }
    }
    if let Some(url) = &source_url {
        if !has_http_scheme(url) {
            errors.push(format!("{path}source_url: '{url}' is not an http(s) url"));
        }
    }

    if errors.len() > before {
        return None;
    }

    Some(StructuredResult {
        time: time?,
        category: category?,
        weight: weight?,
        summary: summary?,
        source_url: source_url?,
    })
}

fn string_field(
    object: &Map<String, Value>,
    field: &str,
    path: &str,
    errors: &mut Vec<String>,
) -> Option<String> {
    match object.get(field) {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => {
            errors.push(format!("{path}{field}: expected a string, got {}", kind(other)));
            None
        }
        None => {
            errors.push(format!("{path}{field}: missing"));
            None
        }
    }
}

fn weight_field(object: &Map<String, Value>, path: &str, errors: &mut Vec<String>) -> Option<u8> {
    let raw = match object.get("weight") {
        Some(raw) => raw,
        None => {
            errors.push(format!("{path}weight: missing"));
            return None;
        }
    };

    let Some(weight) = coerce_integer(raw) else {
        errors.push(format!("{path}weight: expected an integer, got {raw}"));
        return None;
    };

    if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        errors.push(format!("{path}weight: {weight} is outside [{MIN_WEIGHT}, {MAX_WEIGHT}]"));
        return None;
    }
    u8::try_from(weight).ok()
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 1e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn has_http_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn record() -> Value {
        json!({
            "time": "2026-10-16 08:00",
            "category": "ETF资金",
            "weight": 72,
            "summary": "Spot BTC ETFs saw a fifth day of inflows.",
            "source_url": "https://news.example/etf"
        })
    }

    fn single(value: &Value) -> (Option<StructuredResult>, ValidationReport) {
        let (enforced, report) = validate(value, SchemaMode::Single);
        let result = enforced.map(|e| match e {
            Enforced::Single(r) => r,
            Enforced::Batch(_) => panic!("batch returned for single mode"),
        });
        (result, report)
    }

    #[test]
    fn test_valid_record() {
        let (result, report) = single(&record());
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
        let result = result.unwrap();
        assert_eq!(result.category, "ETF资金");
        assert_eq!(result.weight, 72);
    }

    #[test_case(json!(-1) ; "below range")]
    #[test_case(json!(101) ; "above range")]
    #[test_case(json!(50.5) ; "fractional")]
    #[test_case(json!("high") ; "word")]
    #[test_case(json!(null) ; "null")]
    fn test_bad_weight_rejected(weight: Value) {
        let mut value = record();
        value["weight"] = weight;
        let (result, report) = single(&value);
        assert!(result.is_none());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("weight:"));
    }

    #[test_case(json!(0), 0 ; "lower bound")]
    #[test_case(json!(100), 100 ; "upper bound")]
    #[test_case(json!(40.0), 40 ; "integral float")]
    #[test_case(json!(" 65 "), 65 ; "numeric string")]
    fn test_weight_repaired(weight: Value, expected: u8) {
        let mut value = record();
        value["weight"] = weight;
        assert_eq!(single(&value).0.unwrap().weight, expected);
    }

    #[test]
    fn test_strings_trimmed() {
        let mut value = record();
        value["category"] = json!("  宏观 ");
        value["source_url"] = json!(" https://news.example/a ");
        let result = single(&value).0.unwrap();
        assert_eq!(result.category, "宏观");
        assert_eq!(result.source_url, "https://news.example/a");
    }

    #[test]
    fn test_missing_and_invalid_fields_all_reported() {
        let value = json!({"time": "t", "weight": 10, "summary": "  ", "source_url": "ftp://x"});
        let (result, report) = single(&value);
        assert!(result.is_none());
        assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
        assert!(report.summary().contains("category: missing"));
        assert!(report.summary().contains("summary: must not be empty"));
        assert!(report.summary().contains("source_url"));
    }

    #[test]
    fn test_empty_batch_is_valid_with_warning() {
        let (enforced, report) = validate(&json!({"results": []}), SchemaMode::Batch);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings, vec![EMPTY_BATCH_WARNING.to_string()]);
        assert_eq!(enforced, Some(Enforced::Batch(BatchResult::default())));
    }

    #[test]
    fn test_batch_bare_array_accepted() {
        let (enforced, report) = validate(&json!([record(), record()]), SchemaMode::Batch);
        assert!(report.is_valid());
        match enforced {
            Some(Enforced::Batch(batch)) => assert_eq!(batch.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_one_bad_record_rejects_batch() {
        let mut bad = record();
        bad["weight"] = json!(101);
        let (enforced, report) = validate(&json!({"results": [record(), bad]}), SchemaMode::Batch);
        assert!(enforced.is_none());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("results[1].weight"));
    }

    #[test]
    fn test_wrong_shapes() {
        assert!(!validate(&json!({"items": []}), SchemaMode::Batch).1.is_valid());
        assert!(!validate(&json!({"results": {}}), SchemaMode::Batch).1.is_valid());
        assert!(!validate(&json!("text"), SchemaMode::Batch).1.is_valid());
        assert!(!validate(&json!([1]), SchemaMode::Batch).1.is_valid());
        assert!(!validate(&json!([]), SchemaMode::Single).1.is_valid());
    }
}
