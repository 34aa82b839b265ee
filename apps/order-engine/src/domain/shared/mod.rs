//! Shared Kernel
//!
//! Value objects used across every bounded context.

mod errors;
mod value_objects;

pub use errors::DomainError;
pub use value_objects::{ClientOrderId, ExchangeOrderId, PairKey, Side, Symbol};
