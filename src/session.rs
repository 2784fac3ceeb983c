//! Session state: who is logged in and with which credentials

use crate::types::Identity;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Holder of the current identity
///
/// Every write happens under one short lock, so a login is observed either fully
/// applied or not at all. Nothing here does I/O.
#[derive(Debug, Default)]
pub struct SessionState {
    identity: RwLock<Identity>,
}

impl SessionState {
    /// Create an empty, logged-out session
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly logged-in identity
    pub fn login(
        &self,
        access_token: String,
        username: String,
        user_id: i64,
        refresh_token: Option<String>,
    ) {
        *self.write() = Identity {
            access_token: Some(access_token),
            refresh_token,
            username: Some(username),
            user_id: Some(user_id),
            is_logged_in: true,
        };
    }

    /// Reset every field. Calling this while logged out is harmless.
    pub fn logout(&self) {
        *self.write() = Identity::default();
    }

    /// Replace the access token after a refresh; identity and login flag stay as they are
    pub fn update_access_token(&self, access_token: String) {
        self.write().access_token = Some(access_token);
    }

    /// Store a refresh token rotated by the backend
    pub fn rotate_refresh_token(&self, refresh_token: String) {
        self.write().refresh_token = Some(refresh_token);
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.read().username.clone()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.read().user_id
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().is_logged_in
    }

    /// Copy of all fields taken under a single read
    pub fn snapshot(&self) -> Identity {
        self.read().clone()
    }

    /// `Authorization` header value for the current access token
    pub fn authorization_header(&self) -> Option<String> {
        self.read()
            .access_token
            .as_ref()
            .map(|token| format!("Bearer {token}"))
    }

    // A panic while holding the lock cannot leave a half-written identity behind
    // (every write is a single assignment), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Identity> {
        self.identity.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Identity> {
        self.identity.write().unwrap_or_else(PoisonError::into_inner)
    }
}
