//! Model provider abstraction.
//!
//! Every model the pipeline talks to (the search-capable snapshot model and
//! the classification model) sits behind [`ChatModel`]. Calls block the
//! calling thread; timeouts are imposed by the transport.

mod openai;

pub use openai::OpenAiCompatibleClient;

use serde::{Deserialize, Serialize};
use sift_common::Result;

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for chat-completion models.
pub trait ChatModel {
    /// Provider name used in logs.
    fn name(&self) -> &str;

    /// Send a chat completion request.
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

impl<T: ChatModel + ?Sized> ChatModel for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        (**self).complete(request)
    }
}

impl<T: ChatModel + ?Sized> ChatModel for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        (**self).complete(request)
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Requested shape of the model's reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// Any single JSON object
    JsonObject,
    /// Provider-validated structured output
    JsonSchema {
        name: String,
        schema: serde_json::Value,
        strict: bool,
    },
}

/// Unified chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Let the model search the web before answering
    pub web_search: bool,
    /// Structured output mode
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: None,
            web_search: false,
            response_format: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// Unified chat response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Model that produced the reply
    pub model: String,
    /// Response content
    pub content: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}
