//! Error types for identity parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating a resource identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identity string is empty.
    #[error("resource identity cannot be empty")]
    Empty,

    /// The identity is missing the `/` separator between namespace and name.
    #[error("resource identity missing '/' separator: {0:?}")]
    MissingSeparator(String),

    /// The namespace part is invalid.
    #[error("invalid namespace {value:?}: {reason}")]
    InvalidNamespace { value: String, reason: &'static str },

    /// The name part is invalid.
    #[error("invalid name {value:?}: {reason}")]
    InvalidName { value: String, reason: &'static str },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
