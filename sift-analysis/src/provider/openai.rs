//! OpenAI-compatible chat completions client.
//!
//! Works against OpenAI, xAI, DeepSeek, OpenRouter and any other endpoint that
//! speaks `POST {base_url}/chat/completions`.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sift_common::util::{log_preview, sanitize_for_log};
use sift_common::{Error, Result};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{ChatModel, ChatRequest, ChatResponse, ResponseFormat, TokenUsage};

/// Blocking client for OpenAI-compatible APIs.
pub struct OpenAiCompatibleClient {
    name: String,
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

impl OpenAiCompatibleClient {
    /// Create a new client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<&str>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            name: name.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Convert a unified request into the wire body.
    fn build_body(&self, request: &ChatRequest) -> WireRequest {
        let response_format = request.response_format.as_ref().map(|format| match format {
            ResponseFormat::JsonObject => WireResponseFormat {
                format_type: "json_object".into(),
                json_schema: None,
            },
            ResponseFormat::JsonSchema {
                name,
                schema,
                strict,
            } => WireResponseFormat {
                format_type: "json_schema".into(),
                json_schema: Some(WireJsonSchema {
                    name: name.clone(),
                    strict: *strict,
                    schema: schema.clone(),
                }),
            },
        });

        WireRequest {
            model: self.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            response_format,
            plugins: request.web_search.then(|| {
                vec![WirePlugin {
                    id: "web".into(),
                }]
            }),
        }
    }

    fn unavailable(&self, message: impl std::fmt::Display) -> Error {
        Error::ProviderUnavailable(format!("[{}:{}] {}", self.name, self.model, message))
    }
}

impl ChatModel for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let start = Instant::now();
        let body = self.build_body(request);

        debug!(
            provider = %self.name,
            model = %self.model,
            messages = body.messages.len(),
            web_search = request.web_search,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .map_err(|e| {
                self.unavailable(format!(
                    "Request failed: {}",
                    sanitize_for_log(&e.to_string())
                ))
            })?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(self.unavailable(format!("HTTP {} - {}", status, log_preview(&text))));
        }

        let wire: WireResponse = response
            .json()
            .map_err(|e| self.unavailable(format!("Failed to parse response: {}", e)))?;

        let choice = wire.choices.into_iter().next();
        let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
        let content = choice.and_then(|c| c.message.content).unwrap_or_default();
        let usage = wire.usage.unwrap_or_default();

        Ok(ChatResponse {
            model: wire.model.unwrap_or_else(|| self.model.clone()),
            content,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            finish_reason,
            latency_ms,
        })
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugins: Option<Vec<WirePlugin>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<WireJsonSchema>,
}

#[derive(Debug, Serialize)]
struct WireJsonSchema {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct WirePlugin {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use serde_json::json;

    fn client() -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(
            "test",
            "https://api.example.com/v1/",
            Some("sk-test"),
            "model-x",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(client().endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_body_with_web_search_plugin() {
        let request = ChatRequest::new(vec![Message::user("snapshot")]).with_web_search();
        let body = serde_json::to_value(client().build_body(&request)).unwrap();

        assert_eq!(body["model"], "model-x");
        assert_eq!(body["plugins"], json!([{ "id": "web" }]));
        assert!(body.get("temperature").is_none());
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_body_with_json_schema() {
        let request = ChatRequest::new(vec![Message::user("classify")])
            .with_temperature(0.2)
            .with_response_format(ResponseFormat::JsonSchema {
                name: "batch".into(),
                schema: json!({ "type": "object" }),
                strict: true,
            });
        let body = serde_json::to_value(client().build_body(&request)).unwrap();

        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "batch");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert!(body.get("plugins").is_none());
    }

    #[test]
    fn test_wire_response_tolerates_missing_fields() {
        let wire: WireResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#).unwrap();
        assert_eq!(wire.choices[0].message.content.as_deref(), Some("hi"));
        assert!(wire.usage.is_none());
    }

    #[test]
    fn test_unreachable_endpoint_is_provider_unavailable() {
        let client = OpenAiCompatibleClient::new(
            "local",
            "http://127.0.0.1:9",
            None,
            "m",
            Duration::from_millis(500),
        );
        let err = client
            .complete(&ChatRequest::new(vec![Message::user("x")]))
            .unwrap_err();
        assert!(err.is_provider_unavailable());
    }
}
