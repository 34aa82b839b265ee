//! Bybit-specific error types.

use thiserror::Error;

use crate::application::ports::ExchangeError;

/// Result code for exceeding the API rate limit.
pub const RET_CODE_RATE_LIMIT: i64 = 10_006;

/// Errors from the Bybit adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BybitError {
    /// HTTP status error without a usable body.
    #[error("HTTP error: {0}")]
    Http(String),

    /// API answered with a non-zero `retCode`.
    #[error("API error: {code} - {message}")]
    Api {
        /// Bybit result code.
        code: i64,
        /// Bybit result message.
        message: String,
    },

    /// Credentials missing, invalid or signature refused.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limited after retries.
    #[error("Rate limited")]
    RateLimited,

    /// The request exceeded the network timeout.
    #[error("Request timed out: {path}")]
    Timeout {
        /// Endpoint path.
        path: String,
    },

    /// Network error.
    #[error("Network error: {0}")]
    Network(String),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// A numeric or enum field could not be parsed.
    #[error("Invalid field {field}: '{value}'")]
    InvalidField {
        /// Field name.
        field: String,
        /// Raw value.
        value: String,
    },

    /// Max retries exceeded.
    #[error("Max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

impl BybitError {
    /// Map a non-zero `retCode` to an error.
    #[must_use]
    pub fn from_ret_code(code: i64, message: String) -> Self {
        match code {
            RET_CODE_RATE_LIMIT => Self::RateLimited,
            10_003 | 10_004 | 10_005 | 33_004 => Self::AuthenticationFailed(message),
            _ => Self::Api { code, message },
        }
    }
}

impl From<BybitError> for ExchangeError {
    fn from(err: BybitError) -> Self {
        match err {
            BybitError::Http(message) | BybitError::Network(message) => {
                Self::Connection { message }
            }
            BybitError::MaxRetriesExceeded { attempts } => Self::Connection {
                message: format!("max retries exceeded after {attempts} attempts"),
            },
            BybitError::Api { code, message } => Self::Rejected { code, message },
            BybitError::AuthenticationFailed(message) => Self::Authentication { message },
            BybitError::RateLimited => Self::RateLimited,
            BybitError::Timeout { path } => Self::Timeout { operation: path },
            BybitError::JsonParse(message) => Self::InvalidResponse { message },
            BybitError::InvalidField { field, value } => Self::InvalidResponse {
                message: format!("invalid {field}: '{value}'"),
            },
        }
    }
}
