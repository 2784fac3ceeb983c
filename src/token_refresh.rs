//! Token refresh coordinator: single-flight refresh and proactive renewal

use crate::auth_client::AuthApi;
use crate::error::ClientError;
use crate::session::SessionState;
use crate::types::RefreshRequest;
use async_singleflight::Group;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// `refreshing` value while no refresh runs; session epochs that can refresh start at 1
const NOT_REFRESHING: u64 = 0;

/// Why a refresh did not produce a new access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailure {
    /// No refresh token or username stored
    MissingCredentials,
    /// The backend refused the refresh token (4xx)
    Rejected { status: u16 },
    /// The backend failed (5xx or other non-2xx)
    ServerError { status: u16 },
    /// 2xx with an empty body
    EmptyBody,
    /// 2xx with a body that is not a refresh response
    InvalidBody,
    /// Network or timeout error
    Transport,
    /// The session was cleared or replaced while the refresh was in flight
    SessionCleared,
    /// The refreshing task died (panic or runtime shutdown) before publishing a result
    Interrupted,
}

impl RefreshFailure {
    fn from_error(err: &ClientError) -> Self {
        match err {
            ClientError::Status { status, .. } if (400..500).contains(status) => {
                RefreshFailure::Rejected { status: *status }
            }
            ClientError::Status { status, .. } => RefreshFailure::ServerError { status: *status },
            ClientError::EmptyBody => RefreshFailure::EmptyBody,
            ClientError::Serialization(_) | ClientError::InvalidResponse(_) => RefreshFailure::InvalidBody,
            _ => RefreshFailure::Transport,
        }
    }

    /// Failures that no amount of waiting will fix end the proactive timer, and so
    /// does a refresh that panicked
    fn stops_auto_refresh(self) -> bool {
        matches!(
            self,
            RefreshFailure::MissingCredentials | RefreshFailure::Rejected { .. } | RefreshFailure::Interrupted
        )
    }
}

/// Result of one physical refresh, shared by every caller that joined it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    Failed(RefreshFailure),
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed)
    }
}

struct Credentials {
    refresh_token: String,
    username: String,
}

/// Holds the "refresh in progress" flag for one physical refresh of one session
/// epoch. A newer epoch may take the flag over from a stale holder. Released on
/// drop, whichever way the refresh ends, unless it was taken over.
struct RefreshClaim<'a> {
    flag: &'a AtomicU64,
    epoch: u64,
}

impl<'a> RefreshClaim<'a> {
    fn acquire(flag: &'a AtomicU64, epoch: u64) -> Option<Self> {
        flag.fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
            (held == NOT_REFRESHING || held < epoch).then_some(epoch)
        })
        .ok()
        .map(|_| Self { flag, epoch })
    }
}

impl Drop for RefreshClaim<'_> {
    fn drop(&mut self) {
        let _ = self
            .flag
            .compare_exchange(self.epoch, NOT_REFRESHING, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Owns the refresh protocol for one session
///
/// * at most one refresh call per session is in flight; concurrent callers join it
///   and all observe its outcome, and it runs to completion even if every caller
///   goes away
/// * a successful refresh installs the new access token into the session and keeps
///   the rotated refresh token for the next round
/// * failures never escape as errors, they flip the validity signal to `false`
/// * while initialized, a background task refreshes every `refresh_interval`
pub struct RefreshCoordinator<A: AuthApi> {
    api: Arc<A>,
    session: Arc<SessionState>,
    refresh_interval: Duration,
    credentials: Mutex<Option<Credentials>>,
    /// Bumped on every initialize/clear; a refresh started under an older epoch
    /// must not touch the session
    epoch: AtomicU64,
    /// Epoch of the refresh in progress, or [`NOT_REFRESHING`]
    refreshing: AtomicU64,
    token_valid: watch::Sender<bool>,
    refresh_singleflight: Group<RefreshOutcome, String>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl<A: AuthApi> RefreshCoordinator<A> {
    pub fn new(api: Arc<A>, session: Arc<SessionState>, refresh_interval: Duration) -> Arc<Self> {
        let (token_valid, _) = watch::channel(false);

        Arc::new(Self {
            api,
            session,
            refresh_interval,
            credentials: Mutex::new(None),
            epoch: AtomicU64::new(0),
            refreshing: AtomicU64::new(NOT_REFRESHING),
            token_valid,
            refresh_singleflight: Group::new(),
            refresh_task: Mutex::new(None),
        })
    }

    /// Store the refresh credentials of a new session and (re)start proactive renewal
    pub fn initialize(self: &Arc<Self>, refresh_token: String, username: String) {
        {
            let mut credentials = self.lock_credentials();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            *credentials = Some(Credentials { refresh_token, username });
        }
        self.token_valid.send_replace(true);

        self.start_auto_refresh();
    }

    /// Refresh the access token, joining a refresh already in flight
    ///
    /// Returns whether the session now holds a freshly minted access token.
    pub async fn refresh_if_needed(self: &Arc<Self>) -> bool {
        self.refresh().await.is_refreshed()
    }

    /// Same single-flight path as [`refresh_if_needed`](Self::refresh_if_needed);
    /// there is no validity check to bypass.
    pub async fn force_refresh(self: &Arc<Self>) -> bool {
        self.refresh_if_needed().await
    }

    /// Refresh and report why it failed, if it did
    pub async fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        // Detached from the caller: dropping this future never cancels a refresh
        // other callers joined, and a rotated refresh token is always stored
        let coordinator = Arc::clone(self);
        tokio::spawn(coordinator.refresh_shared())
            .await
            .unwrap_or(RefreshOutcome::Failed(RefreshFailure::Interrupted))
    }

    async fn refresh_shared(self: Arc<Self>) -> RefreshOutcome {
        // Keyed by epoch so a new session never joins the previous session's refresh
        let epoch = self.epoch.load(Ordering::Acquire);
        let coordinator = Arc::clone(&self);

        // Error type is String because singleflight requires a shared error type.
        // The physical refresh runs in its own task so a panic cannot leave the
        // flight unresolved.
        let (outcome, error, shared) = self.refresh_singleflight.work(&epoch.to_string(), async move {
            tokio::spawn(async move { coordinator.do_refresh(epoch).await })
                .await
                .map_err(|e| e.to_string())
        }).await;

        if let Some(error) = error {
            warn!(epoch, error = %error, "Token refresh task died");
        }
        if shared {
            debug!(?outcome, "Joined in-flight token refresh");
        }

        outcome.unwrap_or(RefreshOutcome::Failed(RefreshFailure::Interrupted))
    }

    /// Drop the session's refresh state: stop the timer, forget the credentials,
    /// mark the token invalid and release a stuck in-progress flag
    pub fn clear(&self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }

        {
            let mut credentials = self.lock_credentials();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            *credentials = None;
        }
        self.token_valid.send_replace(false);
        self.refreshing.store(NOT_REFRESHING, Ordering::Release);

        debug!("Token refresh state cleared");
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire) != NOT_REFRESHING
    }

    pub fn is_token_valid(&self) -> bool {
        *self.token_valid.borrow()
    }

    /// Watch the validity signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.token_valid.subscribe()
    }

    async fn do_refresh(&self, epoch: u64) -> RefreshOutcome {
        let request = {
            let credentials = self.lock_credentials();
            if self.epoch.load(Ordering::Acquire) != epoch {
                debug!(epoch, "Session changed before refresh started");
                return RefreshOutcome::Failed(RefreshFailure::SessionCleared);
            }

            match credentials.as_ref() {
                Some(credentials) => RefreshRequest {
                    refresh_token: credentials.refresh_token.clone(),
                    username: credentials.username.clone(),
                },
                None => {
                    debug!("No refresh credentials stored");
                    self.token_valid.send_replace(false);
                    return RefreshOutcome::Failed(RefreshFailure::MissingCredentials);
                }
            }
        };

        let Some(_claim) = RefreshClaim::acquire(&self.refreshing, epoch) else {
            // Held by a newer session's refresh
            debug!(epoch, "Refresh superseded by a newer session");
            return RefreshOutcome::Failed(RefreshFailure::SessionCleared);
        };

        debug!(username = %request.username, "Refreshing access token");

        match self.api.refresh(&request).await {
            Ok(response) if response.authentication_token.is_empty() => {
                warn!(username = %request.username, "Refresh response carried no access token");
                self.fail_if_current(epoch, RefreshFailure::EmptyBody)
            }
            Ok(response) => {
                let mut credentials = self.lock_credentials();
                if self.epoch.load(Ordering::Acquire) != epoch {
                    info!(username = %request.username, "Session changed during refresh, discarding new tokens");
                    return RefreshOutcome::Failed(RefreshFailure::SessionCleared);
                }

                self.session.update_access_token(response.authentication_token);
                self.session.rotate_refresh_token(response.refresh_token.clone());
                if let Some(credentials) = credentials.as_mut() {
                    credentials.refresh_token = response.refresh_token;
                }
                drop(credentials);

                self.token_valid.send_replace(true);
                info!(username = %request.username, "Access token refreshed successfully");
                RefreshOutcome::Refreshed
            }
            Err(e) => {
                let failure = RefreshFailure::from_error(&e);
                warn!(
                    username = %request.username,
                    error = %e,
                    ?failure,
                    "Token refresh failed"
                );
                self.fail_if_current(epoch, failure)
            }
        }
    }

    fn fail_if_current(&self, epoch: u64, failure: RefreshFailure) -> RefreshOutcome {
        let _credentials = self.lock_credentials();
        if self.epoch.load(Ordering::Acquire) == epoch {
            self.token_valid.send_replace(false);
        }
        RefreshOutcome::Failed(failure)
    }

    fn start_auto_refresh(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime, proactive token refresh disabled");
            return;
        };

        let coordinator = Arc::downgrade(self);
        let period = self.refresh_interval;
        let task = runtime.spawn(Self::run_refresh_task(coordinator, period));

        if let Some(previous) = self.lock_task().replace(task) {
            previous.abort();
        }
    }

    /// Refresh every `period` until cleared or dropped, or until a refresh is refused
    /// or panics
    async fn run_refresh_task(coordinator: Weak<Self>, period: Duration) {
        info!(interval_secs = %period.as_secs(), "Started auto-refresh task");

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let Some(coordinator) = coordinator.upgrade() else {
                debug!("Coordinator dropped, stopping auto-refresh");
                break;
            };

            match coordinator.refresh().await {
                RefreshOutcome::Refreshed => debug!("Auto-refresh successful"),
                RefreshOutcome::Failed(failure) if failure.stops_auto_refresh() => {
                    warn!(?failure, "Auto-refresh failed, stopping proactive refresh");
                    break;
                }
                RefreshOutcome::Failed(failure) => {
                    warn!(?failure, "Auto-refresh failed, will retry on next tick");
                }
            }
        }
    }

    fn lock_credentials(&self) -> MutexGuard<'_, Option<Credentials>> {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.refresh_task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A: AuthApi> Drop for RefreshCoordinator<A> {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }
    }
}
