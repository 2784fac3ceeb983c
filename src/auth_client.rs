//! Auth endpoints: login and token refresh

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::debug;

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh/token";

/// Macro to turn a non-2xx response into a status error
macro_rules! check_response {
    ($response:expr) => {
        if !$response.status().is_success() {
            let status = $response.status().as_u16();
            let text = $response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, &text));
        }
    };
}

/// The two unauthenticated endpoints the session layer talks to
///
/// Implemented over HTTP by [`AuthApiHttp`]; tests substitute a scripted one.
pub trait AuthApi: Send + Sync + 'static {
    /// Exchange credentials for a session
    fn login(&self, request: &LoginRequest) -> impl Future<Output = Result<LoginResponse>> + Send;

    /// Exchange a refresh token for a new access token
    ///
    /// Non-2xx responses fail with [`ClientError::Status`], a 2xx with an empty
    /// body with [`ClientError::EmptyBody`].
    fn refresh(&self, request: &RefreshRequest) -> impl Future<Output = Result<RefreshResponse>> + Send;
}

/// HTTP implementation of [`AuthApi`]
#[derive(Debug, Clone)]
pub struct AuthApiHttp {
    config: ClientConfig,
    http_client: Client,
}

impl AuthApiHttp {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { config, http_client })
    }

    /// Underlying HTTP client, shared with the authorized transport
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(path);

        let response = self.http_client
            .post(&url)
            .json(body)
            .send()
            .await?;

        debug!(url = %url, status = %response.status(), "Auth endpoint responded");
        check_response!(response);

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(ClientError::EmptyBody);
        }

        Ok(serde_json::from_str(&text)?)
    }
}

impl AuthApi for AuthApiHttp {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        self.post_json(LOGIN_PATH, request).await
    }

    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResponse> {
        self.post_json(REFRESH_PATH, request).await
    }
}
