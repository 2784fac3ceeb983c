//! Per-user follow-status cache, cleared when the session ends

use crate::context::LogoutListener;
use papaya::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Thread-safe cache of "am I following this user" answers
///
/// Cloning is cheap and clones share the same maps.
#[derive(Clone)]
pub struct FollowStatusCache {
    following: Arc<HashMap<i64, bool>>,
    loading: Arc<HashMap<i64, ()>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl FollowStatusCache {
    pub fn new() -> Self {
        Self {
            following: Arc::new(HashMap::new()),
            loading: Arc::new(HashMap::new()),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Record the answer for `user_id`; a recorded answer ends its loading state
    pub fn set_following(&self, user_id: i64, following: bool) {
        self.following.pin().insert(user_id, following);
        self.loading.pin().remove(&user_id);
    }

    /// Cached answer, `None` when unknown
    pub fn is_following(&self, user_id: i64) -> Option<bool> {
        self.following.pin().get(&user_id).copied()
    }

    pub fn set_loading(&self, user_id: i64, loading: bool) {
        if loading {
            self.loading.pin().insert(user_id, ());
        } else {
            self.loading.pin().remove(&user_id);
        }
    }

    pub fn is_loading(&self, user_id: i64) -> bool {
        self.loading.pin().contains_key(&user_id)
    }

    pub fn set_error(&self, message: Option<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = message;
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget everything
    pub fn clear_all(&self) {
        self.following.pin().clear();
        self.loading.pin().clear();
        self.set_error(None);
    }
}

impl Default for FollowStatusCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LogoutListener for FollowStatusCache {
    fn on_logout(&self) {
        self.clear_all();
    }
}
