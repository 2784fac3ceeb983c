//! Authorized HTTP transport: bearer token on every request, one replay on 401

use crate::auth_client::AuthApi;
use crate::error::{ClientError, Result};
use crate::session::SessionState;
use crate::token_refresh::RefreshCoordinator;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// HTTP client that authenticates every request with the current session token
///
/// When a logged-in request comes back 401, the token is refreshed through the
/// coordinator and the same request is sent once more. If the refresh fails, or the
/// request body cannot be replayed, the caller gets the original 401 response.
pub struct AuthorizedHttp<A: AuthApi> {
    http_client: Client,
    session: Arc<SessionState>,
    coordinator: Arc<RefreshCoordinator<A>>,
}

impl<A: AuthApi> AuthorizedHttp<A> {
    pub fn new(http_client: Client, session: Arc<SessionState>, coordinator: Arc<RefreshCoordinator<A>>) -> Self {
        Self {
            http_client,
            session,
            coordinator,
        }
    }

    /// Client for building requests to pass to [`execute`](Self::execute)
    pub fn client(&self) -> &Client {
        &self.http_client
    }

    pub async fn execute(&self, request: Request) -> Result<Response> {
        let replay = request.try_clone();
        let response = self.http_client.execute(self.authorize(request)).await?;

        if response.status() != StatusCode::UNAUTHORIZED || !self.session.is_logged_in() {
            return Ok(response);
        }

        let Some(replay) = replay else {
            debug!(url = %response.url(), "Request body cannot be replayed, returning 401");
            return Ok(response);
        };

        if !self.coordinator.refresh_if_needed().await || self.session.access_token().is_none() {
            warn!(url = %response.url(), "Token refresh failed, returning 401");
            return Ok(response);
        }

        drop(response);
        info!(url = %replay.url(), "Replaying request with refreshed token");

        Ok(self.http_client.execute(self.authorize(replay)).await?)
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.execute(request.build()?).await
    }

    /// Send and decode a JSON body, turning non-2xx into [`ClientError::Status`]
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::from_status(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Err(ClientError::EmptyBody);
        }

        Ok(serde_json::from_str(&text)?)
    }

    fn authorize(&self, mut request: Request) -> Request {
        if let Some(header) = self.session.authorization_header() {
            match HeaderValue::from_str(&header) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.headers_mut().insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "Access token is not a valid header value"),
            }
        }
        request
    }
}
