//! Infrastructure Layer
//!
//! Adapters implementing the application ports.
//!
//! - `exchange`: Bybit v5 HTTP adapter and an in-process simulated exchange
//! - `persistence`: SQLite and in-memory state stores
//! - `control`: HTTP client for the bot start callback
//! - `events`: event publishers
//! - `http`: axum control-plane server
//! - `config`: dependency wiring

pub mod config;
pub mod control;
pub mod events;
pub mod exchange;
pub mod http;
pub mod persistence;
