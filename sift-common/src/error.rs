//! Error types for the sift pipeline.
//!
//! The variants follow how far a failure is allowed to travel:
//!
//! | Variant               | Raised by                    | Reaches the caller? |
//! |-----------------------|------------------------------|---------------------|
//! | `ProviderUnavailable` | model transport / auth       | no, degraded        |
//! | `QualityRejected`     | snapshot validation          | no, next tier       |
//! | `SchemaViolation`     | typed-call enforcement       | one batch only      |
//! | `UnrecoverableFormat` | native-JSON repair ladder    | one batch only      |
//! | `Config`              | thresholds, templates, files | yes                 |

use thiserror::Error;

/// Result type alias using the sift error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the analysis pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Network or authentication failure while reaching a model
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Content was fetched but did not pass snapshot validation
    #[error("Quality rejected (score {score:.2}): {reason}")]
    QualityRejected { score: f64, reason: String },

    /// Structured call exhausted its retries without a valid response
    #[error("Schema violation after {attempts} attempt(s): {reason}")]
    SchemaViolation { attempts: u32, reason: String },

    /// Free-form JSON response could not be recovered by any extraction stage
    #[error("Unrecoverable response format: {0}")]
    UnrecoverableFormat(String),

    /// Invalid threshold, malformed template or bad configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all context layers peeled off.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a provider transport/auth failure.
    pub fn is_provider_unavailable(&self) -> bool {
        matches!(self.root(), Self::ProviderUnavailable(_))
    }

    /// Check if this error ends a single enforcement call.
    pub fn is_enforcement_failure(&self) -> bool {
        matches!(
            self.root(),
            Self::SchemaViolation { .. } | Self::UnrecoverableFormat(_)
        )
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self.root(), Self::Config(_))
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        assert!(Error::ProviderUnavailable("down".into()).is_provider_unavailable());
        assert!(Error::SchemaViolation {
            attempts: 3,
            reason: "weight".into()
        }
        .is_enforcement_failure());
        assert!(Error::UnrecoverableFormat("prose".into()).is_enforcement_failure());
        assert!(Error::Config("threshold".into()).is_config());
        assert!(!Error::Config("threshold".into()).is_enforcement_failure());
    }

    #[test]
    fn test_error_with_context_keeps_kind() {
        let err = Error::UnrecoverableFormat("no json".into()).with_context("batch 2");
        assert!(matches!(err, Error::WithContext { .. }));
        assert!(err.is_enforcement_failure());
        assert_eq!(err.to_string(), "batch 2: Unrecoverable response format: no json");
    }

    #[test]
    fn test_result_ext_context() {
        let parsed: std::result::Result<serde_json::Value, serde_json::Error> =
            serde_json::from_str("{not json");
        let err = parsed.context("reading cache").unwrap_err();
        assert!(err.to_string().starts_with("reading cache: JSON error"));
    }
}
