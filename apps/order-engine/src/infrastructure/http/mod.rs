//! HTTP/REST control plane.
//!
//! Inbound adapter exposing order, position, bot lifecycle and recovery
//! operations.

mod controller;
mod request;
mod response;

pub use controller::{AppState, create_router};
pub use request::*;
pub use response::*;
