//! Order execution errors.

use thiserror::Error;

use super::OrderStatus;

/// Errors raised by the order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Invalid state transition attempted.
    #[error("invalid order transition {from} -> {to}: {reason}")]
    InvalidStateTransition {
        /// Current order status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid order parameters.
    #[error("invalid order parameter {field}: {message}")]
    InvalidParameters {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },
}
