//! Error types for the feed client

use crate::types::ApiErrorBody;
use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Non-2xx response from the backend
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Empty response body")]
    EmptyBody,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Build a status error from a non-2xx response body.
    ///
    /// The backend answers with an [`ApiErrorBody`] envelope; field errors win over
    /// the top-level message, and an unparseable body falls back to the status code.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|envelope| envelope.user_message())
            .unwrap_or_else(|| format!("Request failed: {status}"));

        ClientError::Status { status, message }
    }

    /// Whether this error means the access token was rejected.
    ///
    /// Only a typed HTTP 401 counts; message text is never inspected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::Status { status: 401, .. })
    }

    /// Whether this error is a 400 validation failure
    pub fn is_validation_error(&self) -> bool {
        matches!(self, ClientError::Status { status: 400, .. })
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
