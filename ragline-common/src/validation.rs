//! Configuration validation for ragline services.
//!
//! Catches values that would only fail later at request time: zero timeouts,
//! unparseable collaborator URLs, colliding ports.

use thiserror::Error;

use crate::config::{
    Config, ConversationConfig, LightRagConfig, LlmConfig, LlmProvider, ObservabilityConfig,
    WrapperConfig,
};
use crate::logging::LogFormat;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// A configuration section that can check itself.
pub trait Validate {
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate every section, collecting all problems rather than stopping
    /// at the first.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.lightrag.validate(),
            self.llm.validate(),
            self.conversation.validate(),
            self.wrapper.validate(),
            self.observability.validate(),
            self.check_port_conflicts(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }

    fn check_port_conflicts(&self) -> ValidationResult<()> {
        if self.chat_port() == self.wrapper_port() {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "Port {} is used by both services.chat.port and services.wrapper.port",
                    self.chat_port()
                ),
            });
        }
        Ok(())
    }

    /// Load, apply environment overrides, and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

fn check_url(field: &str, value: &str) -> ValidationResult<()> {
    url::Url::parse(value).map_err(|e| ValidationError::InvalidValue {
        field: field.into(),
        reason: format!("invalid URL {value}: {e}"),
    })?;
    Ok(())
}

fn check_positive(field: &str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: "must be greater than 0".into(),
        });
    }
    Ok(())
}

/// Longest idle period a session may be kept for.
pub const MAX_SESSION_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

fn check_at_most(field: &str, value: u64, max: u64) -> ValidationResult<()> {
    if value > max {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("must be at most {max}"),
        });
    }
    Ok(())
}

impl Validate for LightRagConfig {
    fn validate(&self) -> ValidationResult<()> {
        check_url("lightrag.url", &self.url)?;
        if let Some(ref stream_url) = self.stream_url {
            check_url("lightrag.stream_url", stream_url)?;
        }
        check_positive("lightrag.timeout_secs", self.timeout_secs)?;
        check_positive("lightrag.decision_timeout_secs", self.decision_timeout_secs)
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.provider != LlmProvider::Openai {
            return Ok(());
        }
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ValidationError::MissingField {
                field: "llm.api_key (required for openai provider)".into(),
            });
        }
        check_url("llm.base_url", &self.base_url)?;
        check_positive("llm.timeout_secs", self.timeout_secs)
    }
}

impl Validate for ConversationConfig {
    fn validate(&self) -> ValidationResult<()> {
        check_positive("conversation.session_timeout_secs", self.session_timeout_secs)?;
        check_at_most(
            "conversation.session_timeout_secs",
            self.session_timeout_secs,
            MAX_SESSION_TIMEOUT_SECS,
        )?;
        check_positive("conversation.request_timeout_secs", self.request_timeout_secs)
    }
}

impl Validate for WrapperConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.words_per_chunk == 0 {
            return Err(ValidationError::InvalidValue {
                field: "wrapper.words_per_chunk".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        self.log_level
            .parse::<tracing::Level>()
            .map_err(|_| ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!(
                    "'{}' is not one of trace, debug, info, warn, error",
                    self.log_level
                ),
            })?;

        self.log_format
            .parse::<LogFormat>()
            .map_err(|reason| ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason,
            })?;

        Ok(())
    }
}
