//! Session error types
//!
//! A missing or expired session is not an error: store lookups return
//! `Option`/`bool` for that case. The variants below are the conditions a
//! caller has to react to.

use std::fmt;

/// Errors that can occur during session operations
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The secure random source could not produce an identifier
    Entropy(String),
    /// The store found itself in an inconsistent state
    Corruption(String),
    /// Writing session state back to the store failed
    Persistence(String),
    /// A value could not be converted to or from JSON
    Serialization(String),
}

impl SessionError {
    /// Whether the error means session isolation can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Entropy(_) | SessionError::Corruption(_))
    }

    /// Wrap a store failure that happened while persisting a request's changes.
    pub(crate) fn persistence(context: &str, err: SessionError) -> Self {
        match err {
            SessionError::Persistence(_) => err,
            other => SessionError::Persistence(format!("{}: {}", context, other)),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Entropy(msg) => write!(f, "Entropy source failure: {}", msg),
            SessionError::Corruption(msg) => write!(f, "Session store corrupted: {}", msg),
            SessionError::Persistence(msg) => write!(f, "Failed to save session: {}", msg),
            SessionError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization(err.to_string())
    }
}

impl From<rand::Error> for SessionError {
    fn from(err: rand::Error) -> Self {
        SessionError::Entropy(err.to_string())
    }
}
