//! HTTP client for the trading bot's start endpoint.

use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{BotControlPort, ControlError};
use crate::domain::recovery::BotConfig;

/// Posts the snapshotted bot configuration to the bot's control endpoint.
#[derive(Debug, Clone)]
pub struct HttpBotLauncher {
    client: reqwest::Client,
    start_url: String,
}

impl HttpBotLauncher {
    /// Create a launcher for `start_url`.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` if the HTTP client cannot be built.
    pub fn new(start_url: impl Into<String>, timeout: Duration) -> Result<Self, ControlError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlError::Unreachable {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            start_url: start_url.into(),
        })
    }
}

#[async_trait]
impl BotControlPort for HttpBotLauncher {
    async fn start_bot(&self, config: &BotConfig) -> Result<(), ControlError> {
        tracing::debug!(url = %self.start_url, symbol = %config.symbol, "Requesting bot start");
        let response = self
            .client
            .post(&self.start_url)
            .json(config)
            .send()
            .await
            .map_err(|e| ControlError::Unreachable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(ControlError::Refused {
            status: status.as_u16(),
            message,
        })
    }
}

/// Used when no control endpoint is configured. Every start fails, so a
/// scheduled restart is logged and the attempt stays recorded.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredBotControl;

#[async_trait]
impl BotControlPort for UnconfiguredBotControl {
    async fn start_bot(&self, _config: &BotConfig) -> Result<(), ControlError> {
        Err(ControlError::Unreachable {
            message: "no bot control URL configured".to_string(),
        })
    }
}
