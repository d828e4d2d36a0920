use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error object reported by the transport, carried verbatim.
///
/// Field names follow the PostgREST error body (`code`, `message`,
/// `details`, `hint`), so a response body deserializes straight into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl TransportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    /// Error without a vendor code (network failure, undecodable body).
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Stable classification of a failed operation.
///
/// `NotFound` is deliberately absent: an absent row is a successful
/// outcome (`Ok(None)`), not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Uniqueness constraint violation.
    Conflict,
    /// Foreign-key violation on insert, update or delete.
    ReferentialIntegrity,
    /// Unsupported where/include/data shape, rejected before any round trip.
    Validation,
    /// Any other transport-reported failure, including cancellation.
    Upstream,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::ReferentialIntegrity => "referential_integrity",
            Self::Validation => "validation",
            Self::Upstream => "upstream",
        };
        write!(f, "{label}")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(TransportError),

    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(TransportError),

    #[error("Upstream error: {0}")]
    Upstream(TransportError),
}

impl AdapterError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wraps a transport error under the given kind.
    ///
    /// `Validation` is reserved for pre-flight checks, so a transport error
    /// handed in under that kind is reported as `Upstream`.
    pub fn from_transport(kind: ErrorKind, err: TransportError) -> Self {
        match kind {
            ErrorKind::Conflict => Self::Conflict(err),
            ErrorKind::ReferentialIntegrity => Self::ReferentialIntegrity(err),
            ErrorKind::Validation | ErrorKind::Upstream => Self::Upstream(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::ReferentialIntegrity(_) => ErrorKind::ReferentialIntegrity,
            Self::Upstream(_) => ErrorKind::Upstream,
        }
    }

    /// The diagnostic text exactly as it was produced.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message) => message,
            Self::Conflict(err) | Self::ReferentialIntegrity(err) | Self::Upstream(err) => {
                &err.message
            }
        }
    }

    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Validation(_) => None,
            Self::Conflict(err) | Self::ReferentialIntegrity(err) | Self::Upstream(err) => {
                Some(err)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Validation(err.to_string())
    }
}
