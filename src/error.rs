use std::collections::BTreeMap;

use thiserror::Error;

/// Per-field validation messages, keyed by form field name.
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected payload: {0}")]
    Decode(String),

    #[error("validation failed on {}", .0.keys().copied().collect::<Vec<_>>().join(", "))]
    Validation(FieldErrors),

    #[error("not signed in")]
    Unauthenticated,

    #[error("signed in as {actual}, this requires {required}")]
    Forbidden {
        required: crate::models::Role,
        actual: crate::models::Role,
    },

    #[error("session store: {0}")]
    Io(#[from] std::io::Error),
}

impl PortalError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Backend-provided message when there is one, otherwise `fallback`.
    pub fn message_or(&self, fallback: &str) -> String {
        match self {
            PortalError::Status { message, .. } if !message.is_empty() => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

pub type PortalResult<T> = Result<T, PortalError>;
