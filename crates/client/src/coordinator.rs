//! Session-timeout state machine.
//!
//! ```text
//!            warning timer                 hard-logout timer
//!   Active ──────────────> WarningShown ─────────────────────> LoggedOut
//!     ^                        │
//!     └──── extend() ok ───────┘   extend() err / logout() ──> LoggedOut
//! ```
//!
//! Each call to [`SessionCoordinator::start`] (and each successful
//! [`SessionCoordinator::extend`]) begins a new timer generation and cancels
//! the previous one, so a stale hard-logout timer can never fire after the
//! session was extended or a new login started.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::AuthClient;
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Display-only countdown until the forced logout.
    WarningShown { remaining_secs: u64 },
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Time from start (or last extension) to forced logout.
    pub session_duration: Duration,
    /// How long before the forced logout the warning appears.
    pub warning_window: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            session_duration: Duration::from_secs(30 * 60),
            warning_window: Duration::from_secs(2 * 60),
        }
    }
}

/// What the coordinator needs from the API layer.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn refresh(&self) -> Result<(), ClientError>;
    /// Revoke server-side where possible and clear local credentials.
    async fn logout(&self);
}

#[async_trait]
impl SessionBackend for AuthClient {
    async fn refresh(&self) -> Result<(), ClientError> {
        AuthClient::refresh(self).await.map(|_| ())
    }

    async fn logout(&self) {
        AuthClient::logout(self).await;
    }
}

struct Inner {
    policy: TimeoutPolicy,
    backend: Arc<dyn SessionBackend>,
    state: watch::Sender<SessionState>,
    /// Parent of every timer generation; cancelled by `stop`.
    root: CancellationToken,
    generation: Mutex<CancellationToken>,
}

#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

impl SessionCoordinator {
    /// The coordinator starts out `LoggedOut`; call [`start`](Self::start)
    /// once the user is authenticated.
    pub fn new(policy: TimeoutPolicy, backend: Arc<dyn SessionBackend>) -> Self {
        let (state, _) = watch::channel(SessionState::LoggedOut);
        let root = CancellationToken::new();
        Self {
            inner: Arc::new(Inner {
                policy,
                backend,
                state,
                generation: Mutex::new(root.child_token()),
                root,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Enter `Active` and schedule both timers from now.
    pub fn start(&self) {
        let cancel = self.inner.root.child_token();
        let previous = std::mem::replace(&mut *lock(&self.inner.generation), cancel.clone());
        previous.cancel();

        self.inner.state.send_replace(SessionState::Active);
        tokio::spawn(run_timers(self.inner.clone(), cancel));
    }

    /// The user chose to stay signed in. On refresh failure the session is
    /// ended and the error returned.
    ///
    /// A session that ends while the refresh is in flight stays ended: the
    /// refreshed credentials are discarded and
    /// [`ClientError::SessionExpired`] is returned.
    pub async fn extend(&self) -> Result<(), ClientError> {
        if self.state() == SessionState::LoggedOut {
            return Err(ClientError::SessionExpired);
        }
        let generation = lock(&self.inner.generation).clone();

        let refreshed = self.inner.backend.refresh().await;

        if self.state() == SessionState::LoggedOut {
            if refreshed.is_ok() {
                tracing::info!("Session ended during extension, discarding refreshed credentials");
                self.inner.backend.logout().await;
            }
            return Err(ClientError::SessionExpired);
        }
        if generation.is_cancelled() {
            // A newer `start` or `stop` owns the timers now.
            return refreshed;
        }

        match refreshed {
            Ok(()) => {
                tracing::debug!("Session extended");
                self.start();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Session extension failed, logging out");
                end_session(&self.inner).await;
                Err(err)
            }
        }
    }

    /// User-initiated logout.
    pub async fn logout(&self) {
        end_session(&self.inner).await;
    }

    /// Cancel all timers without changing state or contacting the server.
    /// Final: timers started afterwards are cancelled immediately.
    pub fn stop(&self) {
        self.inner.root.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `LoggedOut` is published before the backend call so an extension that
/// completes during the logout sees it.
async fn end_session(inner: &Inner) {
    lock(&inner.generation).cancel();
    inner.state.send_replace(SessionState::LoggedOut);
    inner.backend.logout().await;
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_millis().div_ceil(1000) as u64
}

/// One timer generation: wait for the warning, then count down to the hard
/// logout. The countdown only feeds the display; the deadline alone decides
/// when the session ends.
async fn run_timers(inner: Arc<Inner>, cancel: CancellationToken) {
    let started = Instant::now();
    let hard_deadline = started + inner.policy.session_duration;
    let warning_at = hard_deadline
        .checked_sub(inner.policy.warning_window)
        .filter(|at| *at > started)
        .unwrap_or(started);

    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = sleep_until(warning_at) => {}
    }

    let mut countdown = tokio::time::interval(Duration::from_secs(1));
    countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let hard_logout = sleep_until(hard_deadline);
    tokio::pin!(hard_logout);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = &mut hard_logout => {
                tracing::info!("Session timed out, forcing logout");
                end_session(&inner).await;
                return;
            }
            _ = countdown.tick() => {
                let remaining = hard_deadline.saturating_duration_since(Instant::now());
                inner.state.send_replace(SessionState::WarningShown {
                    remaining_secs: ceil_secs(remaining),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBackend {
        refresh_ok: bool,
        refresh_delay: Duration,
        refreshes: AtomicUsize,
        logouts: AtomicUsize,
    }

    impl FakeBackend {
        fn new(refresh_ok: bool) -> Arc<Self> {
            Self::slow(refresh_ok, Duration::ZERO)
        }

        fn slow(refresh_ok: bool, refresh_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                refresh_ok,
                refresh_delay,
                refreshes: AtomicUsize::new(0),
                logouts: AtomicUsize::new(0),
            })
        }

        fn logouts(&self) -> usize {
            self.logouts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionBackend for FakeBackend {
        async fn refresh(&self) -> Result<(), ClientError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if !self.refresh_delay.is_zero() {
                tokio::time::sleep(self.refresh_delay).await;
            }
            if self.refresh_ok {
                Ok(())
            } else {
                Err(ClientError::SessionExpired)
            }
        }

        async fn logout(&self) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn policy() -> TimeoutPolicy {
        TimeoutPolicy {
            session_duration: Duration::from_secs(60),
            warning_window: Duration::from_secs(10),
        }
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn warning_then_forced_logout() {
        let backend = FakeBackend::new(true);
        let coordinator = SessionCoordinator::new(policy(), backend.clone());
        assert_eq!(coordinator.state(), SessionState::LoggedOut);

        coordinator.start();
        advance(49).await;
        assert_eq!(coordinator.state(), SessionState::Active);

        advance(2).await;
        assert!(matches!(
            coordinator.state(),
            SessionState::WarningShown { remaining_secs } if (9..=10).contains(&remaining_secs)
        ));

        advance(10).await;
        assert_eq!(coordinator.state(), SessionState::LoggedOut);
        assert_eq!(backend.logouts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn extend_reschedules_from_now() {
        let backend = FakeBackend::new(true);
        let coordinator = SessionCoordinator::new(policy(), backend.clone());

        coordinator.start();
        advance(55).await;
        assert!(matches!(coordinator.state(), SessionState::WarningShown { .. }));

        coordinator.extend().await.unwrap();
        assert_eq!(coordinator.state(), SessionState::Active);

        // Past the original deadline, before the new warning.
        advance(45).await;
        assert_eq!(coordinator.state(), SessionState::Active);
        assert_eq!(backend.logouts(), 0);
        assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_extension_logs_out() {
        let backend = FakeBackend::new(false);
        let coordinator = SessionCoordinator::new(policy(), backend.clone());

        coordinator.start();
        advance(52).await;

        assert_eq!(coordinator.extend().await, Err(ClientError::SessionExpired));
        assert_eq!(coordinator.state(), SessionState::LoggedOut);
        assert_eq!(backend.logouts(), 1);

        advance(60).await;
        assert_eq!(backend.logouts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hard_logout_during_extension_is_final() {
        let backend = FakeBackend::slow(true, Duration::from_secs(5));
        let coordinator = SessionCoordinator::new(policy(), backend.clone());

        coordinator.start();
        advance(58).await;
        let extension = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.extend().await }
        });

        advance(3).await;
        assert_eq!(coordinator.state(), SessionState::LoggedOut);
        assert_eq!(backend.logouts(), 1);

        advance(3).await;
        assert_eq!(extension.await.unwrap(), Err(ClientError::SessionExpired));
        assert_eq!(coordinator.state(), SessionState::LoggedOut);
        // The refreshed session was handed back to the backend to discard.
        assert_eq!(backend.logouts(), 2);

        advance(120).await;
        assert_eq!(coordinator.state(), SessionState::LoggedOut);
        assert_eq!(backend.logouts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn user_logout_during_extension_is_final() {
        let backend = FakeBackend::slow(true, Duration::from_secs(5));
        let coordinator = SessionCoordinator::new(policy(), backend.clone());

        coordinator.start();
        advance(52).await;
        let extension = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.extend().await }
        });
        advance(1).await;
        coordinator.logout().await;

        assert_eq!(extension.await.unwrap(), Err(ClientError::SessionExpired));
        assert_eq!(coordinator.state(), SessionState::LoggedOut);
        advance(120).await;
        assert_eq!(coordinator.state(), SessionState::LoggedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_cancels_pending_timers() {
        let backend = FakeBackend::new(true);
        let coordinator = SessionCoordinator::new(policy(), backend.clone());

        coordinator.start();
        advance(5).await;
        coordinator.logout().await;
        advance(120).await;

        assert_eq!(coordinator.state(), SessionState::LoggedOut);
        assert_eq!(backend.logouts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_generation() {
        let backend = FakeBackend::new(true);
        let coordinator = SessionCoordinator::new(policy(), backend.clone());

        coordinator.start();
        advance(30).await;
        coordinator.start();
        advance(40).await;

        // The first generation's deadline (60s) has passed without effect.
        assert_eq!(coordinator.state(), SessionState::Active);
        assert_eq!(backend.logouts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_silences_timers() {
        let backend = FakeBackend::new(true);
        let coordinator = SessionCoordinator::new(policy(), backend.clone());

        coordinator.start();
        coordinator.stop();
        advance(120).await;

        assert_eq!(coordinator.state(), SessionState::Active);
        assert_eq!(backend.logouts(), 0);
    }

    #[tokio::test]
    async fn extend_after_logout_is_rejected() {
        let backend = FakeBackend::new(true);
        let coordinator = SessionCoordinator::new(policy(), backend.clone());

        assert_eq!(coordinator.extend().await, Err(ClientError::SessionExpired));
        assert_eq!(backend.refreshes.load(Ordering::SeqCst), 0);
    }
}
