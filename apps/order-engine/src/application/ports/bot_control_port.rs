//! Bot Control Port (Driven Port)
//!
//! Control-plane callback used to start the trading bot after a crash.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::recovery::BotConfig;

/// Errors from the bot control plane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// Control plane unreachable.
    #[error("Bot control unreachable: {message}")]
    Unreachable {
        /// Error details.
        message: String,
    },

    /// Control plane refused the request.
    #[error("Bot control refused start ({status}): {message}")]
    Refused {
        /// Response status.
        status: u16,
        /// Response body.
        message: String,
    },
}

/// Port for the bot start entry point.
#[async_trait]
pub trait BotControlPort: Send + Sync {
    /// Start the trading bot with `config`.
    async fn start_bot(&self, config: &BotConfig) -> Result<(), ControlError>;
}
