//! Feed Auth Client
//!
//! Authenticated API access for the feed client: in-memory session state,
//! single-flight access token refresh with proactive renewal, and retry-once
//! wrapping of authenticated calls, either per call or at the HTTP transport.

pub mod auth_client;
pub mod config;
pub mod context;
pub mod error;
pub mod follow_cache;
pub mod session;
pub mod token_refresh;
pub mod token_utils;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use auth_client::{AuthApi, AuthApiHttp};
pub use config::ClientConfig;
pub use context::{AuthContext, LogoutListener};
pub use error::{ClientError, Result};
pub use follow_cache::FollowStatusCache;
pub use session::SessionState;
pub use token_refresh::{RefreshCoordinator, RefreshFailure, RefreshOutcome};
pub use token_utils::execute_with_token_refresh;
pub use transport::AuthorizedHttp;
pub use types::{Identity, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse};
