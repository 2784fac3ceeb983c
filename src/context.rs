//! Auth context: one session, one refresh coordinator, and the caches that must
//! forget the user on logout

use crate::auth_client::AuthApi;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::session::SessionState;
use crate::token_refresh::RefreshCoordinator;
use crate::token_utils::execute_with_token_refresh;
use crate::transport::AuthorizedHttp;
use crate::types::{LoginRequest, LoginResponse};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Per-user state owned elsewhere that must be dropped on logout
pub trait LogoutListener: Send + Sync {
    fn on_logout(&self);
}

/// Everything an authenticated caller needs, constructed once per running app
pub struct AuthContext<A: AuthApi> {
    api: Arc<A>,
    session: Arc<SessionState>,
    coordinator: Arc<RefreshCoordinator<A>>,
    logout_listeners: Mutex<Vec<Arc<dyn LogoutListener>>>,
}

impl<A: AuthApi> AuthContext<A> {
    pub fn new(api: A, config: &ClientConfig) -> Self {
        let api = Arc::new(api);
        let session = Arc::new(SessionState::new());
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&api),
            Arc::clone(&session),
            config.refresh_interval(),
        );

        Self {
            api,
            session,
            coordinator,
            logout_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Establish a session
    ///
    /// With a refresh token and a non-empty username, proactive refresh starts.
    /// Without one, the session works until its access token expires.
    pub fn login(
        &self,
        access_token: String,
        username: String,
        user_id: i64,
        refresh_token: Option<String>,
    ) {
        self.session.login(access_token, username.clone(), user_id, refresh_token.clone());

        match refresh_token {
            Some(refresh_token) if !username.is_empty() => {
                self.coordinator.initialize(refresh_token, username.clone());
            }
            _ => {
                debug!(username = %username, "No refresh credentials, token refresh disabled");
                self.coordinator.clear();
            }
        }

        info!(username = %username, user_id = %user_id, "Logged in");
    }

    /// End the session and tell every registered cache to forget the user
    pub fn logout(&self) {
        self.coordinator.clear();
        self.session.logout();

        let listeners = self
            .logout_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_logout();
        }

        info!("Logged out");
    }

    /// Call the login endpoint and, on success, establish the session from its answer
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let api = &self.api;
        let request = &request;

        let response = execute_with_token_refresh(&self.coordinator, move || api.login(request)).await?;

        self.login(
            response.authentication_token.clone(),
            response.username.clone(),
            response.user_id,
            response.refresh_token.clone(),
        );

        Ok(response)
    }

    /// Run an authenticated operation with the retry-once policy, handing it the
    /// `Authorization` header value current at each attempt
    pub async fn execute_authenticated<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = &self.session;
        execute_with_token_refresh(&self.coordinator, move || {
            operation(session.authorization_header())
        })
        .await
    }

    /// Whether the session holds an access token
    pub fn is_token_valid(&self) -> bool {
        let identity = self.session.snapshot();
        identity.is_logged_in && identity.access_token.is_some()
    }

    pub async fn force_refresh(&self) -> bool {
        self.coordinator.force_refresh().await
    }

    pub fn register_logout_listener(&self, listener: Arc<dyn LogoutListener>) {
        self.logout_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Transport that attaches the bearer token and replays once on 401
    pub fn authorized_http(&self, http_client: reqwest::Client) -> AuthorizedHttp<A> {
        AuthorizedHttp::new(
            http_client,
            Arc::clone(&self.session),
            Arc::clone(&self.coordinator),
        )
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator<A>> {
        &self.coordinator
    }
}
