//! Error types for Eidolon

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("session busy: {0}")]
    SessionBusy(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("empty input")]
    EmptyInput,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("collaborator error: {service} - {message}")]
    Collaborator { service: String, message: String },

    #[error("deadline exceeded: {service} after {millis}ms")]
    DeadlineExceeded { service: String, millis: u64 },

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::AuthFailed {
            reason: reason.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn collaborator(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Transient failures degrade the turn; everything else is surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Collaborator { .. } | Self::DeadlineExceeded { .. }
        )
    }
}
