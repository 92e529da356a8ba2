//! Configuration validation for sift.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{AnalysisConfig, Config, LlmConfig, ObservabilityConfig, SnapshotConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl From<ValidationError> for crate::Error {
    fn from(err: ValidationError) -> Self {
        crate::Error::Config(err.to_string())
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Check that a threshold lies in the closed unit interval.
pub fn check_unit_interval(field: &str, value: f64) -> ValidationResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("{value} is outside [0, 1]"),
        })
    }
}

fn check_http_url(field: &str, value: &str) -> ValidationResult<()> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        }),
        Err(e) => Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: e.to_string(),
        }),
    }
}

fn check_non_empty(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField {
            field: field.into(),
        })
    } else {
        Ok(())
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        let sections: [&dyn Validate; 4] =
            [&self.observability, &self.llm, &self.snapshot, &self.analysis];
        for section in sections {
            match section.validate() {
                Ok(()) => {}
                Err(ValidationError::Multiple(inner)) => errors.extend(inner),
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of {LEVELS:?}"),
            });
        }
        Ok(())
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> ValidationResult<()> {
        check_http_url("llm.base_url", &self.base_url)?;
        check_non_empty("llm.model", &self.model)?;
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidValue {
                field: "llm.temperature".into(),
                reason: "must be between 0.0 and 2.0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for SnapshotConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.ttl_minutes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "snapshot.ttl_minutes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidValue {
                field: "snapshot.temperature".into(),
                reason: "must be between 0.0 and 2.0".into(),
            });
        }
        if self.enabled && !self.simulate {
            check_http_url("snapshot.base_url", &self.base_url)?;
            check_non_empty("snapshot.model", &self.model)?;
        }
        for (i, secondary) in self.secondary.iter().enumerate() {
            check_http_url(&format!("snapshot.secondary[{i}].base_url"), &secondary.base_url)?;
            check_non_empty(&format!("snapshot.secondary[{i}].model"), &secondary.model)?;
        }
        Ok(())
    }
}

impl Validate for AnalysisConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.batch_size == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "analysis.batch_size".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if let Err(e) = check_unit_interval(
            "analysis.consistency_threshold",
            self.consistency_threshold,
        ) {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}
