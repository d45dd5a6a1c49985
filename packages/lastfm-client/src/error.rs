//! Scrobbling service error types

use thiserror::Error;

/// Scrobbling client errors
#[derive(Error, Debug)]
pub enum LastfmError {
    /// API key or shared secret is missing
    #[error("API key and shared secret are required for scrobbling service access")]
    MissingCredentials,

    /// Invalid input provided to an API method
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("failed to parse service response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Service returned an error not covered by a dedicated variant
    #[error("service error {code}: {message}")]
    Api { code: i32, message: String },

    /// Session key was rejected (error code 9); re-authentication is required
    #[error("session key is invalid or has expired")]
    SessionInvalid,

    /// Request token has not been authorized by the user yet (error code 14)
    #[error("request token has not been authorized")]
    TokenNotAuthorized,

    /// Service is offline or temporarily unavailable (error codes 11, 16)
    #[error("service temporarily unavailable (code {0})")]
    ServiceUnavailable(i32),

    /// Rate limited by the service
    #[error("rate limited by scrobbling service")]
    RateLimited,

    /// Request timeout
    #[error("request to scrobbling service timed out")]
    Timeout,
}

impl LastfmError {
    /// Check if this error is retryable (transient failure)
    ///
    /// Retries on:
    /// - Timeouts
    /// - Rate limiting
    /// - Service-offline error codes
    /// - Transport errors (connect, timeout)
    /// - Server errors (5xx)
    ///
    /// Does NOT retry on authentication problems or client errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            LastfmError::Timeout
            | LastfmError::RateLimited
            | LastfmError::ServiceUnavailable(_) => true,
            LastfmError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            _ => false,
        }
    }

    /// Check if this error indicates the session key is no longer usable
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, LastfmError::SessionInvalid)
    }

    /// Map a service error code to the matching variant
    pub(crate) fn from_api_code(code: i32, message: String) -> Self {
        match code {
            9 => LastfmError::SessionInvalid,
            14 => LastfmError::TokenNotAuthorized,
            11 | 16 => LastfmError::ServiceUnavailable(code),
            29 => LastfmError::RateLimited,
            _ => LastfmError::Api { code, message },
        }
    }
}

/// Result type for scrobbling operations
pub type LastfmResult<T> = Result<T, LastfmError>;
