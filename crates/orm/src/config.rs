//! ORM Configuration
//!
//! Runtime knobs for the query pipeline, loadable from the environment.

use std::env;
use std::str::FromStr;

use thiserror::Error;

/// Environment variable holding the lifecycle hook concurrency bound
pub const HOOK_CONCURRENCY_ENV: &str = "ELIF_ORM_HOOK_CONCURRENCY";

/// Environment variable toggling strict attribute checking on records
pub const STRICT_ATTRIBUTES_ENV: &str = "ELIF_ORM_STRICT_ATTRIBUTES";

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

/// Pipeline configuration shared by every live model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrmConfig {
    /// Default number of per-record lifecycle hooks allowed in flight at once
    /// when the adapter does not impose its own bound
    pub hook_concurrency: usize,
    /// Reject record attributes the model does not declare
    pub strict_attributes: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            hook_concurrency: 16,
            strict_attributes: true,
        }
    }
}

impl OrmConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            hook_concurrency: parse_env(HOOK_CONCURRENCY_ENV, "positive integer")?
                .unwrap_or(defaults.hook_concurrency),
            strict_attributes: parse_env(STRICT_ATTRIBUTES_ENV, "true or false")?
                .unwrap_or(defaults.strict_attributes),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hook_concurrency == 0 {
            return Err(ConfigError::validation_failed(
                "hook_concurrency must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn with_hook_concurrency(mut self, hook_concurrency: usize) -> Self {
        self.hook_concurrency = hook_concurrency;
        self
    }

    pub fn with_strict_attributes(mut self, strict_attributes: bool) -> Self {
        self.strict_attributes = strict_attributes;
        self
    }
}

fn parse_env<T: FromStr>(name: &str, expected: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(name, raw, expected)),
        Err(_) => Ok(None),
    }
}
