//! Unified error types for the domain layer
//!
//! Every fallible domain operation (request validation, parameter mapping,
//! job state transitions) reports through [`DomainError`], so the engine can
//! turn it into a typed generation error without string matching.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Validation failed (e.g., missing mask, slider out of range)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Parse error (for wire strings such as modes and model references)
    #[error("Parse error: {0}")]
    Parse(String),

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl DomainError {
    /// Creates a validation error for request rule violations.
    ///
    /// Use this when a request can never succeed as submitted:
    /// - Required inputs are empty or missing
    /// - Values are outside allowed ranges
    ///
    /// # Example
    /// ```ignore
    /// if mask.is_none() {
    ///     return Err(DomainError::validation("inpaint requires a mask"));
    /// }
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a parse error for string-to-type conversion failures.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("inpaint requires a mask");
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Validation failed: inpaint requires a mask");
    }

    #[test]
    fn test_parse_error() {
        let err = DomainError::parse("unknown mode: sculpt");
        assert!(matches!(err, DomainError::Parse(_)));
        assert!(!err.is_validation());
        assert!(err.to_string().contains("sculpt"));
    }

    #[test]
    fn test_invalid_state_transition_error() {
        let err = DomainError::invalid_state_transition("Succeeded -> Processing");
        assert_eq!(
            err.to_string(),
            "Invalid state transition: Succeeded -> Processing"
        );
    }
}
