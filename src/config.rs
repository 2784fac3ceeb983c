//! Client configuration

use crate::error::{ClientError, Result};
use std::time::Duration;

/// Default backend address (the Android emulator's alias for the host machine
/// is `http://10.0.2.2:8080`)
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Access tokens live 15 minutes; refresh one minute before that
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 14 * 60;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration for the feed API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL without a trailing slash
    pub base_url: String,

    /// Interval of the proactive background refresh, in seconds
    /// Default: 840 seconds (14 minutes)
    pub refresh_interval_secs: u64,

    /// Per-request timeout, in seconds
    /// Default: 30 seconds
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, refresh_interval_secs: u64, request_timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            refresh_interval_secs,
            request_timeout_secs,
        }
    }

    /// Read the configuration from the environment, falling back to defaults
    ///
    /// * `FEED_API_URL`
    /// * `FEED_REFRESH_INTERVAL_SECS`
    /// * `FEED_REQUEST_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("FEED_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let refresh_interval_secs = env_secs("FEED_REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS)?;
        let request_timeout_secs = env_secs("FEED_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        let config = Self::new(base_url, refresh_interval_secs, request_timeout_secs);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ClientError::Configuration("base URL is empty".to_string()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ClientError::Configuration(
                "refresh interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_BASE_URL,
            DEFAULT_REFRESH_INTERVAL_SECS,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )
    }
}

fn env_secs(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ClientError::Configuration(format!("{key}={raw:?}: {e}"))),
        Err(_) => Ok(default),
    }
}
