//! Unified error types for the domain layer
//!
//! Provides a common error type for template reconciliation and identifier
//! parsing, so adapters never have to fall back to String errors.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid ID format or reserved ID value
    #[error("Invalid ID: {0}")]
    InvalidId(String),

    /// Stored data and canonical template disagree on the `template` discriminator.
    ///
    /// This indicates data corruption or template drift, never a user error.
    #[error("Template mismatch: expected {expected:?}, found {found:?}")]
    TemplateMismatch {
        expected: Option<String>,
        found: Option<String>,
    },

    /// Canonical template is malformed
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// Parse error (for value objects)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    /// Create an invalid ID error
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Create a template mismatch error
    pub fn template_mismatch(expected: Option<&str>, found: Option<&str>) -> Self {
        Self::TemplateMismatch {
            expected: expected.map(str::to_string),
            found: found.map(str::to_string),
        }
    }

    /// Create an invalid template error
    pub fn invalid_template(msg: impl Into<String>) -> Self {
        Self::InvalidTemplate(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// True when the error signals corrupted data rather than bad input.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Self::TemplateMismatch { .. } | Self::InvalidTemplate(_)
        )
    }
}
