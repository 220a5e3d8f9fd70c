//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required field was empty or missing
    #[error("Missing {field}")]
    MissingField { field: String },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },

    /// Parse error for incoming data
    #[error("Failed to parse {field}: {reason}")]
    ParseError { field: String, reason: String },
}

impl DomainError {
    /// Shorthand for a missing field.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Shorthand for a parse failure of `field`.
    pub fn parse<E: std::fmt::Display>(field: impl Into<String>, err: E) -> Self {
        Self::ParseError {
            field: field.into(),
            reason: err.to_string(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(DomainError::missing("phone").to_string(), "Missing phone");

        let err = DomainError::InvalidFieldValue {
            field: "calling_code".to_string(),
            value: "abc".to_string(),
            expected: "digits with optional leading '+'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid calling_code: abc (expected digits with optional leading '+')"
        );

        let err = DomainError::parse("user", "unexpected end of input");
        assert_eq!(
            err.to_string(),
            "Failed to parse user: unexpected end of input"
        );
    }
}
