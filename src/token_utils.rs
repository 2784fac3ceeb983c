//! Retry-once wrapper for authenticated calls

use crate::auth_client::AuthApi;
use crate::error::Result;
use crate::token_refresh::RefreshCoordinator;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Run an authenticated operation, refreshing the token and retrying once if the
/// backend rejects it with 401
///
/// `operation` is invoked at most twice. The second attempt's outcome is final,
/// whatever it is. Failures other than 401 are returned untouched without a refresh,
/// and if the refresh fails the original 401 is returned.
pub async fn execute_with_token_refresh<A, T, F, Fut>(
    coordinator: &Arc<RefreshCoordinator<A>>,
    mut operation: F,
) -> Result<T>
where
    A: AuthApi,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let err = match operation().await {
        Ok(value) => return Ok(value),
        Err(err) if err.is_auth_failure() => err,
        Err(err) => return Err(err),
    };

    debug!(error = %err, "Authenticated call rejected, refreshing token");

    if coordinator.refresh_if_needed().await {
        debug!("Token refreshed, retrying call");
        operation().await
    } else {
        warn!(error = %err, "Token refresh failed, giving up on call");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::session::SessionState;
    use crate::testutil::{MockAuthApi, MockRefresh};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn logged_in(api: MockAuthApi) -> (Arc<MockAuthApi>, Arc<RefreshCoordinator<MockAuthApi>>) {
        let api = Arc::new(api);
        let session = Arc::new(SessionState::new());
        let coordinator = RefreshCoordinator::new(Arc::clone(&api), Arc::clone(&session), Duration::from_secs(600));
        session.login("stale".to_string(), "alice".to_string(), 42, Some("refresh-0".to_string()));
        coordinator.initialize("refresh-0".to_string(), "alice".to_string());
        (api, coordinator)
    }

    fn unauthorized() -> ClientError {
        ClientError::from_status(401, "")
    }

    #[tokio::test]
    async fn test_success_needs_no_refresh() {
        let (api, coordinator) = logged_in(MockAuthApi::new());
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result = execute_with_token_refresh(&coordinator, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("posts")
        })
        .await;

        assert_eq!(result.unwrap(), "posts");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_retries_exactly_once_after_refresh() {
        let (api, coordinator) = logged_in(MockAuthApi::new());
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result = execute_with_token_refresh(&coordinator, move || async move {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(unauthorized()),
                _ => Ok(7),
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_second_failure_is_final() {
        let (api, coordinator) = logged_in(MockAuthApi::new());
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result: Result<()> = execute_with_token_refresh(&coordinator, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(unauthorized())
        })
        .await;

        assert!(result.unwrap_err().is_auth_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_when_refresh_fails() {
        let (api, coordinator) = logged_in(MockAuthApi::new());
        api.push_refresh(MockRefresh::Status(401));
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result: Result<()> = execute_with_token_refresh(&coordinator, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::from_status(401, r#"{"message":"Token expired"}"#))
        })
        .await;

        match result {
            Err(ClientError::Status { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Token expired");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_refresh_on_other_failures() {
        let (api, coordinator) = logged_in(MockAuthApi::new());
        let calls = AtomicUsize::new(0);

        for err in [
            ClientError::from_status(403, ""),
            ClientError::from_status(500, ""),
            ClientError::InvalidResponse("401 Unauthorized".to_string()),
        ] {
            let mut err = Some(err);
            let result: Result<()> = execute_with_token_refresh(&coordinator, || {
                calls.fetch_add(1, Ordering::SeqCst);
                let err = err.take();
                async move { Err(err.unwrap_or(ClientError::NotLoggedIn)) }
            })
            .await;
            assert!(result.is_err());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(api.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let (api, coordinator) = logged_in(MockAuthApi::with_delay(Duration::from_millis(50)));
        let calls_a = AtomicUsize::new(0);
        let calls_b = AtomicUsize::new(0);

        let op = |label: &'static str, counter: &AtomicUsize| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 { Err(unauthorized()) } else { Ok(label) }
            }
        };

        let (a, b) = tokio::join!(
            execute_with_token_refresh(&coordinator, || op("a", &calls_a)),
            execute_with_token_refresh(&coordinator, || op("b", &calls_b)),
        );

        assert_eq!(a.unwrap(), "a");
        assert_eq!(b.unwrap(), "b");
        assert_eq!(calls_a.load(Ordering::SeqCst), 2);
        assert_eq!(calls_b.load(Ordering::SeqCst), 2);
        assert_eq!(api.refresh_calls(), 1);
    }
}
