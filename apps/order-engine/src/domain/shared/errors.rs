//! Domain errors shared by all contexts.

use thiserror::Error;

/// Domain-level errors that can occur in business logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Invalid state transition attempted.
    #[error("{entity} cannot transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        /// Entity type (e.g., "Order").
        entity: String,
        /// Current state.
        from: String,
        /// Attempted state.
        to: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid value for a field.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },
}

impl DomainError {
    /// Shorthand for an `InvalidValue` error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_display() {
        let err = DomainError::invalid_value("quantity", "must be positive");
        assert_eq!(err.to_string(), "invalid value for quantity: must be positive");
    }

    #[test]
    fn invalid_transition_display() {
        let err = DomainError::InvalidStateTransition {
            entity: "Order".to_string(),
            from: "Filled".to_string(),
            to: "Cancelled".to_string(),
            reason: "terminal".to_string(),
        };
        assert!(err.to_string().contains("Filled"));
        assert!(err.to_string().contains("Cancelled"));
    }
}
