//! Test helpers: a scripted in-memory auth backend

use crate::auth_client::AuthApi;
use crate::error::{ClientError, Result};
use crate::types::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const TEST_PASSWORD: &str = "secret";
pub const TEST_USER_ID: i64 = 42;

/// Scripted answer for the next refresh call
#[derive(Debug, Clone, Copy)]
pub enum MockRefresh {
    Ok,
    Status(u16),
    Empty,
    Panic,
}

/// In-memory [`AuthApi`]
///
/// Refreshes succeed with `access-<n>` / `refresh-<n>` unless a scripted answer
/// is queued. Login succeeds for [`TEST_PASSWORD`] and fails with 401 otherwise.
#[derive(Default)]
pub struct MockAuthApi {
    delay: Duration,
    script: Mutex<VecDeque<MockRefresh>>,
    refresh_calls: AtomicUsize,
    last_refresh: Mutex<Option<RefreshRequest>>,
}

impl MockAuthApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn push_refresh(&self, answer: MockRefresh) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn last_refresh(&self) -> Option<RefreshRequest> {
        self.last_refresh.lock().unwrap().clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl AuthApi for MockAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        self.pause().await;

        if request.password != TEST_PASSWORD {
            return Err(ClientError::from_status(401, r#"{"message":"Bad credentials"}"#));
        }

        Ok(LoginResponse {
            authentication_token: "access-login".to_string(),
            refresh_token: Some("refresh-login".to_string()),
            expires_at: None,
            username: request.username.clone(),
            user_id: TEST_USER_ID,
        })
    }

    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResponse> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_refresh.lock().unwrap() = Some(request.clone());
        let answer = self.script.lock().unwrap().pop_front().unwrap_or(MockRefresh::Ok);

        self.pause().await;

        match answer {
            MockRefresh::Ok => Ok(RefreshResponse {
                authentication_token: format!("access-{call}"),
                refresh_token: format!("refresh-{call}"),
                expires_at: None,
                username: Some(request.username.clone()),
            }),
            MockRefresh::Status(status) => Err(ClientError::from_status(status, "")),
            MockRefresh::Empty => Err(ClientError::EmptyBody),
            MockRefresh::Panic => panic!("auth backend crashed mid-refresh"),
        }
    }
}
