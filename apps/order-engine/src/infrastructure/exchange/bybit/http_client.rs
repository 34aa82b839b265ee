//! Signed HTTP client with retry logic.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;

use super::api_types::BybitEnvelope;
use super::config::{BybitConfig, RetryConfig};
use super::error::BybitError;

type HmacSha256 = Hmac<Sha256>;

/// HTTP client for the Bybit v5 API.
#[derive(Debug, Clone)]
pub struct BybitHttpClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    recv_window: String,
    retry_config: RetryConfig,
}

impl BybitHttpClient {
    /// Create a new HTTP client from config.
    pub fn new(config: &BybitConfig) -> Result<Self, BybitError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(BybitError::AuthenticationFailed(
                "api key and secret are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BybitError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            base_url: config.base_url.clone(),
            recv_window: config.recv_window_ms.to_string(),
            retry_config: config.retry.clone(),
        })
    }

    /// Signed GET, retried on transient failures.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BybitError> {
        let query_string = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let url = if query_string.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query_string}", self.base_url)
        };

        let mut backoff = ExponentialBackoff::new(&self.retry_config);
        loop {
            let (timestamp, signature) = self.sign(&query_string)?;
            let result = self
                .send(self.client.get(&url), path, &timestamp, &signature)
                .await;

            match result {
                Err(err) if is_retryable(&err) => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            path,
                            error = %err,
                            delay_ms = delay.as_millis(),
                            attempt = backoff.attempt,
                            "Transient exchange error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(match err {
                        BybitError::RateLimited | BybitError::Timeout { .. } => err,
                        _ => BybitError::MaxRetriesExceeded {
                            attempts: backoff.attempt,
                        },
                    });
                }
                other => return other,
            }
        }
    }

    /// Signed POST with a JSON body. Never retried.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BybitError> {
        let payload =
            serde_json::to_string(body).map_err(|e| BybitError::JsonParse(e.to_string()))?;
        let (timestamp, signature) = self.sign(&payload)?;
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json")
            .body(payload);
        self.send(request, path, &timestamp, &signature).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
        timestamp: &str,
        signature: &str,
    ) -> Result<T, BybitError> {
        let response = request
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-SIGN-TYPE", "2")
            .header("X-BAPI-TIMESTAMP", timestamp)
            .header("X-BAPI-RECV-WINDOW", &self.recv_window)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BybitError::Timeout {
                        path: path.to_string(),
                    }
                } else {
                    BybitError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BybitError::Timeout {
                    path: path.to_string(),
                }
            } else {
                BybitError::Network(e.to_string())
            }
        })?;

        match categorize_status(status) {
            ErrorCategory::RateLimited => return Err(BybitError::RateLimited),
            ErrorCategory::Retryable => {
                return Err(BybitError::Http(format!("{status}: {text}")));
            }
            ErrorCategory::NonRetryable if !status.is_success() => {
                return match status {
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        Err(BybitError::AuthenticationFailed(text))
                    }
                    _ => Err(BybitError::Http(format!("{status}: {text}"))),
                };
            }
            ErrorCategory::NonRetryable => {}
        }

        let envelope: BybitEnvelope =
            serde_json::from_str(&text).map_err(|e| BybitError::JsonParse(e.to_string()))?;
        if envelope.ret_code != 0 {
            return Err(BybitError::from_ret_code(
                envelope.ret_code,
                envelope.ret_msg,
            ));
        }
        serde_json::from_value(envelope.result).map_err(|e| BybitError::JsonParse(e.to_string()))
    }

    /// Timestamp and signature for a payload.
    fn sign(&self, payload: &str) -> Result<(String, String), BybitError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign_payload(
            &self.api_secret,
            &timestamp,
            &self.api_key,
            &self.recv_window,
            payload,
        )?;
        Ok((timestamp, signature))
    }
}

/// HMAC-SHA256 of `timestamp + api_key + recv_window + payload`, hex encoded.
fn sign_payload(
    secret: &str,
    timestamp: &str,
    api_key: &str,
    recv_window: &str,
    payload: &str,
) -> Result<String, BybitError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BybitError::AuthenticationFailed(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(api_key.as_bytes());
    mac.update(recv_window.as_bytes());
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

const fn is_retryable(err: &BybitError) -> bool {
    matches!(
        err,
        BybitError::RateLimited
            | BybitError::Timeout { .. }
            | BybitError::Network(_)
            | BybitError::Http(_)
    )
}

/// Error category for determining retry behavior.
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Exponential backoff with jitter.
struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    current_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            current_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return None;
        }

        let backoff = self.current_backoff;
        self.current_backoff = Duration::from_secs_f64(
            (self.current_backoff.as_secs_f64() * self.multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );

        let jitter_ms = (backoff.as_millis() as u64) / 4;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        Some(backoff + Duration::from_millis(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_hex() {
        let a = sign_payload("secret", "1700000000000", "key", "5000", "category=linear").unwrap();
        let b = sign_payload("secret", "1700000000000", "key", "5000", "category=linear").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_covers_payload() {
        let a = sign_payload("secret", "1", "key", "5000", "symbol=BTCUSDT").unwrap();
        let b = sign_payload("secret", "1", "key", "5000", "symbol=ETHUSDT").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn categorize_statuses() {
        assert!(matches!(
            categorize_status(StatusCode::TOO_MANY_REQUESTS),
            ErrorCategory::RateLimited
        ));
        assert!(matches!(
            categorize_status(StatusCode::BAD_GATEWAY),
            ErrorCategory::Retryable
        ));
        assert!(matches!(
            categorize_status(StatusCode::OK),
            ErrorCategory::NonRetryable
        ));
    }

    #[test]
    fn backoff_grows_and_stops() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        };
        let mut backoff = ExponentialBackoff::new(&config);

        let first = backoff.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let second = backoff.next_backoff().unwrap();
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(250));
        assert!(backoff.next_backoff().is_none());
    }

    #[test]
    fn empty_credentials_rejected() {
        let config = BybitConfig::new(String::new(), String::new(), "http://localhost");
        assert!(matches!(
            BybitHttpClient::new(&config),
            Err(BybitError::AuthenticationFailed(_))
        ));
    }
}
