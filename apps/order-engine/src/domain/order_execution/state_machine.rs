//! Order State Machine
//!
//! Validates order status transitions.

use super::{OrderError, OrderStatus};

/// Order state machine for validating transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            (OrderStatus::Pending, OrderStatus::PartiallyFilled)
                | (OrderStatus::Pending, OrderStatus::Filled)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Cancelled)
        )
    }

    /// Validate a state transition.
    ///
    /// # Errors
    ///
    /// Returns error if the transition is invalid.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            return Ok(());
        }
        let reason = if from.is_terminal() {
            format!("order is already {from}")
        } else {
            format!("{from} cannot move to {to}")
        };
        Err(OrderError::InvalidStateTransition { from, to, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_fill_directly() {
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Filled
        ));
    }

    #[test]
    fn partial_fill_progression() {
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::PartiallyFilled
        ));
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::PartiallyFilled,
            OrderStatus::PartiallyFilled
        ));
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::PartiallyFilled,
            OrderStatus::Filled
        ));
    }

    #[test]
    fn partially_filled_cannot_be_rejected() {
        assert!(!OrderStateMachine::is_valid_transition(
            OrderStatus::PartiallyFilled,
            OrderStatus::Rejected
        ));
    }

    #[test]
    fn terminal_states_are_final() {
        for from in [
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
        ] {
            for to in [
                OrderStatus::Pending,
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Cancelled,
                OrderStatus::Rejected,
            ] {
                let err = OrderStateMachine::validate_transition(from, to).unwrap_err();
                assert!(err.to_string().contains("already"));
            }
        }
    }
}
