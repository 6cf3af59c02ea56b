//! Rule engine error types

use mailrule_common::EnvelopeKey;
use mailrule_storage::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading rules and stores
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read rule document: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse rule document: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Unterminated substitution in template '{0}'")]
    UnterminatedToken(String),
    #[error("Invalid substitution '${{{token}}}' in template '{template}'")]
    InvalidToken { template: String, token: String },
    #[error("Unknown envelope field: {0}")]
    UnknownField(String),
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
    #[error("Reference to undeclared store '{0}'")]
    UnknownStore(String),
    #[error("Invalid envelope: {0}")]
    Envelope(#[from] mailrule_common::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{section} '{name}': {source}")]
    Entry {
        section: &'static str,
        name: String,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    /// Attach the section and name of the entry being loaded
    pub fn in_entry(self, section: &'static str, name: &str) -> Self {
        ConfigError::Entry {
            section,
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

/// Errors raised while evaluating a rule for one transaction
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Rule not found: {0}")]
    RuleNotFound(String),
    #[error("Envelope field not set: {0}")]
    FieldNotFound(EnvelopeKey),
    #[error("Capture group ${{{index}}} out of range ({available} captured)")]
    CaptureIndexOutOfRange { index: usize, available: usize },
    #[error("Store not found: {0}")]
    StoreNotFound(String),
    #[error("Lookup in store '{store}' timed out after {}ms", .timeout.as_millis())]
    LookupTimeout { store: String, timeout: Duration },
    #[error("Lookup in store '{store}' failed: {source}")]
    Store {
        store: String,
        #[source]
        source: StoreError,
    },
}

/// Result type for evaluation
pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            EvalError::RuleNotFound(_) => "RULE_NOT_FOUND",
            EvalError::FieldNotFound(_) => "FIELD_NOT_FOUND",
            EvalError::CaptureIndexOutOfRange { .. } => "CAPTURE_OUT_OF_RANGE",
            EvalError::StoreNotFound(_) => "STORE_NOT_FOUND",
            EvalError::LookupTimeout { .. } => "LOOKUP_TIMEOUT",
            EvalError::Store { .. } => "STORE_ERROR",
        }
    }
}
