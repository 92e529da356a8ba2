//! Schema as the model sees it.
//!
//! The native-JSON strategy appends [`description`] to the system message;
//! the typed-call strategy sends [`json_schema`] as a strict structured
//! output format. Both state the constraints enforced in [`super::validate`].

use serde_json::{json, Value};

use super::validate::{MAX_WEIGHT, MIN_WEIGHT};
use super::SchemaMode;

/// Natural-language schema appended to the system message.
pub fn description(mode: SchemaMode) -> String {
    let record = format!(
        "\
- \"time\": string, when the event happened as stated in the item (e.g. \"2026-10-16 08:00\")
- \"category\": string, a short category label you choose
- \"weight\": integer from {MIN_WEIGHT} to {MAX_WEIGHT}, market importance
- \"summary\": non-empty string, one paragraph
- \"source_url\": string starting with http:// or https://, the url of the item"
    );

    match mode {
        SchemaMode::Single => format!(
            "\n\n## Output format\n\
只输出 JSON。Reply with a single JSON object and nothing else, no prose, no code fences. \
The object has exactly these fields:\n{record}"
        ),
        SchemaMode::Batch => format!(
            "\n\n## Output format\n\
只输出 JSON。Reply with a single JSON object and nothing else, no prose, no code fences: \
{{\"results\": [ ... ]}}. Each element of \"results\" has exactly these fields:\n{record}\n\
\"results\" may be an empty list when no item qualifies: {{\"results\": []}}"
        ),
    }
}

/// JSON Schema for strict structured output.
pub fn json_schema(mode: SchemaMode) -> Value {
    let record = json!({
        "type": "object",
        "properties": {
            "time": { "type": "string" },
            "category": { "type": "string" },
            "weight": { "type": "integer", "minimum": MIN_WEIGHT, "maximum": MAX_WEIGHT },
            "summary": { "type": "string", "minLength": 1 },
            "source_url": { "type": "string", "pattern": "^https?://" }
        },
        "required": super::validate::FIELDS,
        "additionalProperties": false
    });

    match mode {
        SchemaMode::Single => record,
        SchemaMode::Batch => json!({
            "type": "object",
            "properties": {
                "results": { "type": "array", "items": record }
            },
            "required": ["results"],
            "additionalProperties": false
        }),
    }
}

/// Name sent alongside the schema.
pub fn schema_name(mode: SchemaMode) -> &'static str {
    match mode {
        SchemaMode::Single => "structured_result",
        SchemaMode::Batch => "batch_result",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate::FIELDS;

    #[test]
    fn test_description_lists_every_field() {
        for mode in [SchemaMode::Single, SchemaMode::Batch] {
            let text = description(mode);
            for field in FIELDS {
                assert!(text.contains(&format!("\"{field}\"")), "{field} missing for {mode:?}");
            }
            assert!(text.contains("0 to 100"));
        }
        assert!(description(SchemaMode::Batch).contains("{\"results\": []}"));
        assert!(!description(SchemaMode::Single).contains("results"));
    }

    #[test]
    fn test_json_schema_shape() {
        let single = json_schema(SchemaMode::Single);
        assert_eq!(single["properties"]["weight"]["maximum"], 100);
        assert_eq!(single["required"].as_array().unwrap().len(), 5);

        let batch = json_schema(SchemaMode::Batch);
        assert_eq!(batch["properties"]["results"]["items"], single);
        assert_eq!(batch["additionalProperties"], false);
    }
}
