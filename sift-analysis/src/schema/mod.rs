//! Structured response enforcement.
//!
//! Two strategies, fixed when the enforcer is built:
//!
//! | Strategy    | Request                         | On bad reply                          | Final failure          |
//! |-------------|---------------------------------|---------------------------------------|------------------------|
//! | typed call  | strict `json_schema` format     | retry inside `Requesting`             | `SchemaViolation`      |
//! | native JSON | schema text + `json_object`     | extraction ladder, then retry         | `UnrecoverableFormat` or `SchemaViolation` |
//!
//! Phases of one attempt:
//!
//! ```text
//! Idle → Requesting → Validating ─────────────→ Done
//!                         └──→ Repairing ──┬──→ Done
//!                                          └──→ Failed
//! ```
//!
//! `max_retries` counts retries, so a call makes at most `max_retries + 1`
//! requests. A failed attempt feeds the rejection reason back to the model
//! before the next one.

mod describe;
pub mod extract;
pub mod validate;

pub use describe::{description, json_schema};
pub use validate::{validate, ValidationReport};

use serde_json::Value;
use sift_common::config::EnforcementMode;
use sift_common::util::log_preview;
use sift_common::{Error, Result};
use tracing::{debug, info, warn};

use crate::provider::{ChatModel, ChatRequest, Message, ResponseFormat};
use crate::types::{BatchResult, StructuredResult};

// ============================================================================
// Types
// ============================================================================

/// Expected response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    Single,
    Batch,
}

/// A validated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enforced {
    Single(StructuredResult),
    Batch(BatchResult),
}

/// Phase of an enforcement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Idle,
    Requesting,
    Validating,
    Repairing,
    Done,
    Failed,
}

/// A successful enforcement call with its trace.
#[derive(Debug, Clone, PartialEq)]
pub struct EnforcementOutcome {
    pub value: Enforced,
    /// Requests sent, including the successful one
    pub attempts: u32,
    /// Phase transitions in order
    pub phases: Vec<AttemptPhase>,
    /// Warnings from the accepted response
    pub warnings: Vec<String>,
}

/// Why an attempt was rejected.
enum Rejection {
    /// Transport or provider error
    Provider(Error),
    /// Reply was not JSON by any extraction stage
    Format { reason: String, reply: String },
    /// Reply was JSON but broke a field constraint
    Invalid { reason: String, reply: String },
}

impl Rejection {
    fn reason(&self) -> String {
        match self {
            Rejection::Provider(e) => e.to_string(),
            Rejection::Format { reason, .. } | Rejection::Invalid { reason, .. } => reason.clone(),
        }
    }

    fn reply(&self) -> Option<&str> {
        match self {
            Rejection::Provider(_) => None,
            Rejection::Format { reply, .. } | Rejection::Invalid { reply, .. } => Some(reply),
        }
    }
}

// ============================================================================
// Enforcer
// ============================================================================

/// Forces model replies into validated [`StructuredResult`] / [`BatchResult`] values.
pub struct SchemaEnforcer<M> {
    model: M,
    strategy: EnforcementMode,
}

impl<M: ChatModel> SchemaEnforcer<M> {
    pub fn new(model: M, strategy: EnforcementMode) -> Self {
        Self { model, strategy }
    }

    pub fn strategy(&self) -> EnforcementMode {
        self.strategy
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Request a response of the given shape, retrying and repairing as the strategy allows.
    pub fn enforce(
        &self,
        messages: &[Message],
        mode: SchemaMode,
        max_retries: u32,
        temperature: f64,
    ) -> Result<EnforcementOutcome> {
        match self.strategy {
            EnforcementMode::TypedCall => {
                self.enforce_typed(messages, mode, max_retries, temperature)
            }
            EnforcementMode::NativeJson => {
                self.enforce_native(messages, mode, max_retries, temperature)
            }
        }
    }

    pub fn enforce_single(
        &self,
        messages: &[Message],
        max_retries: u32,
        temperature: f64,
    ) -> Result<StructuredResult> {
        match self.enforce(messages, SchemaMode::Single, max_retries, temperature)?.value {
            Enforced::Single(result) => Ok(result),
            Enforced::Batch(_) => {
                Err(Error::UnrecoverableFormat("expected a single result".into()))
            }
        }
    }

    pub fn enforce_batch(
        &self,
        messages: &[Message],
        max_retries: u32,
        temperature: f64,
    ) -> Result<BatchResult> {
        match self.enforce(messages, SchemaMode::Batch, max_retries, temperature)?.value {
            Enforced::Batch(batch) => Ok(batch),
            Enforced::Single(result) => Ok(BatchResult::new(vec![result])),
        }
    }

    // ------------------------------------------------------------------------
    // Typed call
    // ------------------------------------------------------------------------

    fn enforce_typed(
        &self,
        messages: &[Message],
        mode: SchemaMode,
        max_retries: u32,
        temperature: f64,
    ) -> Result<EnforcementOutcome> {
        let format = ResponseFormat::JsonSchema {
            name: describe::schema_name(mode).to_string(),
            schema: json_schema(mode),
            strict: true,
        };
        let mut conversation = messages.to_vec();
        let mut phases = vec![AttemptPhase::Idle, AttemptPhase::Requesting];
        let total = max_retries.saturating_add(1);
        let mut last: Option<Rejection> = None;

        for attempt in 1..=total {
            let request = ChatRequest::new(conversation.clone())
                .with_temperature(temperature)
                .with_response_format(format.clone());

            let rejection = match self.model.complete(&request) {
                Ok(response) => match serde_json::from_str::<Value>(response.content.trim()) {
                    Ok(value) => {
                        let (enforced, report) = validate(&value, mode);
                        match enforced {
                            Some(value) => {
                                phases.extend([AttemptPhase::Validating, AttemptPhase::Done]);
                                info!(model = self.model.name(), attempt, "Typed call validated");
                                return Ok(EnforcementOutcome {
                                    value,
                                    attempts: attempt,
                                    phases,
                                    warnings: report.warnings,
                                });
                            }
                            None => Rejection::Invalid {
                                reason: report.summary(),
                                reply: response.content,
                            },
                        }
                    }
                    Err(e) => Rejection::Invalid {
                        reason: format!("reply does not match the declared schema: {e}"),
                        reply: response.content,
                    },
                },
                Err(e) => Rejection::Provider(e),
            };

            self.log_rejection(attempt, total, &rejection);
            if attempt < total {
                push_feedback(&mut conversation, &rejection);
            }
            last = Some(rejection);
        }

        Err(match last {
            Some(Rejection::Provider(e)) => e,
            Some(rejection) => Error::SchemaViolation {
                attempts: total,
                reason: rejection.reason(),
            },
            None => Error::SchemaViolation {
                attempts: 0,
                reason: "no attempt made".into(),
            },
        })
    }

    // ------------------------------------------------------------------------
    // Native JSON
    // ------------------------------------------------------------------------

    fn enforce_native(
        &self,
        messages: &[Message],
        mode: SchemaMode,
        max_retries: u32,
        temperature: f64,
    ) -> Result<EnforcementOutcome> {
        let mut conversation = with_schema_description(messages, mode);
        let mut phases = vec![AttemptPhase::Idle];
        let total = max_retries.saturating_add(1);
        let mut last: Option<Rejection> = None;

        for attempt in 1..=total {
            phases.push(AttemptPhase::Requesting);
            let request = ChatRequest::new(conversation.clone())
                .with_temperature(temperature)
                .with_response_format(ResponseFormat::JsonObject);

            let rejection = match self.model.complete(&request) {
                Ok(response) => {
                    phases.push(AttemptPhase::Validating);
                    match self.native_reply(&response.content, mode, &mut phases) {
                        Ok((value, warnings)) => {
                            phases.push(AttemptPhase::Done);
                            info!(
                                model = self.model.name(),
                                attempt,
                                "Native JSON reply validated"
                            );
                            return Ok(EnforcementOutcome {
                                value,
                                attempts: attempt,
                                phases,
                                warnings,
                            });
                        }
                        Err(rejection) => rejection,
                    }
                }
                Err(e) => Rejection::Provider(e),
            };

            phases.push(AttemptPhase::Failed);
            self.log_rejection(attempt, total, &rejection);
            if attempt < total {
                push_feedback(&mut conversation, &rejection);
            }
            last = Some(rejection);
        }

        Err(match last {
            Some(Rejection::Provider(e)) => e,
            Some(Rejection::Format { reason, .. }) => {
                Error::UnrecoverableFormat(format!("{reason} after {total} attempt(s)"))
            }
            Some(Rejection::Invalid { reason, .. }) => Error::SchemaViolation {
                attempts: total,
                reason,
            },
            None => Error::SchemaViolation {
                attempts: 0,
                reason: "no attempt made".into(),
            },
        })
    }

    /// Parse, repair if needed, validate.
    fn native_reply(
        &self,
        content: &str,
        mode: SchemaMode,
        phases: &mut Vec<AttemptPhase>,
    ) -> std::result::Result<(Enforced, Vec<String>), Rejection> {
        let value = match serde_json::from_str::<Value>(content.trim()) {
            Ok(value) => value,
            Err(e) => {
                phases.push(AttemptPhase::Repairing);
                debug!(error = %e, "Reply is not bare JSON, running extraction ladder");
                match extract::extract(content, mode) {
                    Some((value, stage)) => {
                        debug!(?stage, "Recovered JSON from reply");
                        value
                    }
                    None => {
                        return Err(Rejection::Format {
                            reason: "no JSON found in reply".into(),
                            reply: content.to_string(),
                        })
                    }
                }
            }
        };

        let (enforced, report) = validate(&value, mode);
        match enforced {
            Some(enforced) => Ok((enforced, report.warnings)),
            None => Err(Rejection::Invalid {
                reason: report.summary(),
                reply: content.to_string(),
            }),
        }
    }

    fn log_rejection(&self, attempt: u32, total: u32, rejection: &Rejection) {
        warn!(
            model = self.model.name(),
            attempt,
            max_attempts = total,
            reason = %rejection.reason(),
            reply = %rejection.reply().map(log_preview).unwrap_or_default(),
            "Response rejected"
        );
    }
}

/// Append the schema description to the system message, or add one.
fn with_schema_description(messages: &[Message], mode: SchemaMode) -> Vec<Message> {
    let schema = description(mode);
    let mut out = messages.to_vec();
    match out.iter_mut().find(|m| m.role == "system") {
        Some(system) => system.content.push_str(&schema),
        None => out.insert(0, Message::system(schema.trim_start())),
    }
    out
}

/// Show the model its rejected reply and why, so the next attempt can correct it.
fn push_feedback(conversation: &mut Vec<Message>, rejection: &Rejection) {
    let Some(reply) = rejection.reply() else {
        return;
    };
    conversation.push(Message::assistant(reply));
    conversation.push(Message::user(format!(
        "上一次回复无效。The previous reply was rejected: {}. \
Reply again with only the JSON object described in the output format.",
        rejection.reason()
    )));
}
