//! Wire types for the auth endpoints and the session identity snapshot

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `POST /api/auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Successful login payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub authentication_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry as epoch seconds; the backend sends it as a float
    #[serde(default)]
    pub expires_at: Option<f64>,
    pub username: String,
    pub user_id: i64,
}

/// Body of `POST /api/auth/refresh/token`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub username: String,
}

/// Successful refresh payload. The refresh token is rotated on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub authentication_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<f64>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Error envelope returned by the backend on non-2xx responses
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub field_errors: Option<BTreeMap<String, String>>,
}

impl ApiErrorBody {
    /// Message suitable for showing to the user, if the envelope carries one
    pub fn user_message(&self) -> Option<String> {
        if let Some(fields) = self.field_errors.as_ref().filter(|f| !f.is_empty()) {
            let joined = fields.values().cloned().collect::<Vec<_>>().join("\n");
            return Some(format!("Validation errors:\n{joined}"));
        }

        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
    }
}

/// Consistent copy of the session fields taken under a single read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<i64>,
    pub is_logged_in: bool,
}
