//! Timer-driven renewal ahead of expiry.
//!
//! The scheduler idles until the store holds a refresh token, then checks
//! immediately and on every `check_interval` tick. A check renews when the
//! access token is missing, broken, expired or inside `renewal_window`, and
//! ends the session when the refresh token itself has expired. Transient
//! renewal failures are left for the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::claims;
use super::{CredentialStore, ForcedLogout, SessionError, TokenRenewer};
use crate::clock::Clock;

/// Default time between health checks.
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default lead time: renew when the access token has this long left or less.
const DEFAULT_RENEWAL_WINDOW_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No refresh token, or not started
    Idle,
    /// Waiting for the next tick
    Armed,
    /// Evaluating token health
    Checking,
    /// Waiting on the renewal endpoint
    Renewing,
}

/// Result of a single health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    NoSession,
    Healthy,
    Renewed,
    /// Renewal failed transiently; try again next tick
    Deferred,
    LoggedOut,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub check_interval: Duration,
    pub renewal_window: chrono::Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            renewal_window: chrono::Duration::minutes(DEFAULT_RENEWAL_WINDOW_MINUTES),
        }
    }
}

#[derive(Clone)]
pub struct RenewalScheduler {
    store: CredentialStore,
    renewer: TokenRenewer,
    clock: Arc<dyn Clock>,
    logout: ForcedLogout,
    settings: SchedulerSettings,
    state: Arc<watch::Sender<SchedulerState>>,
}

impl RenewalScheduler {
    pub fn new(
        store: CredentialStore,
        renewer: TokenRenewer,
        clock: Arc<dyn Clock>,
        logout: ForcedLogout,
        mut settings: SchedulerSettings,
    ) -> Self {
        // tokio intervals panic on a zero period
        settings.check_interval = settings.check_interval.max(Duration::from_millis(1));
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            store,
            renewer,
            clock,
            logout,
            settings,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Spawn the timer loop. The loop lives until the returned handle is
    /// stopped or dropped.
    pub fn start(&self) -> SchedulerHandle {
        info!(
            interval_secs = self.settings.check_interval.as_secs(),
            "Starting renewal scheduler"
        );
        let scheduler = self.clone();
        let task = tokio::spawn(async move { scheduler.run().await });
        SchedulerHandle {
            task: Some(task),
            state: Arc::clone(&self.state),
        }
    }

    /// Run one health check against the current session.
    pub async fn check_once(&self) -> CheckOutcome {
        let session = self.store.snapshot();
        let Some(refresh) = session.refresh_token() else {
            return CheckOutcome::NoSession;
        };
        let now = self.clock.now();

        if claims::is_expired_at(refresh, now) {
            self.logout.trigger(&SessionError::ExpiredCredential);
            return CheckOutcome::LoggedOut;
        }

        let needs_renewal = match session.access_token() {
            None => true,
            Some(access) => {
                !claims::is_valid_structure(access)
                    || claims::is_expired_at(access, now)
                    || claims::will_expire_within_at(access, self.settings.renewal_window, now)
            }
        };
        if !needs_renewal {
            debug!("Access token healthy");
            return CheckOutcome::Healthy;
        }

        let before = self.state.send_replace(SchedulerState::Renewing);
        let outcome = match self.renewer.renew().await {
            Ok(_) => CheckOutcome::Renewed,
            Err(e) if e.is_fatal() => {
                self.logout.trigger(&e);
                CheckOutcome::LoggedOut
            }
            Err(e) => {
                warn!(error = %e, "Scheduled renewal deferred");
                CheckOutcome::Deferred
            }
        };
        self.state.send_replace(before);
        outcome
    }

    async fn run(self) {
        let mut session = self.store.subscribe();
        loop {
            self.state.send_replace(SchedulerState::Idle);
            if session.wait_for(|c| c.refresh_token().is_some()).await.is_err() {
                return;
            }
            debug!("Refresh token present, arming scheduler");
            self.state.send_replace(SchedulerState::Armed);

            let mut ticker = tokio::time::interval(self.settings.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.state.send_replace(SchedulerState::Checking);
                        match self.check_once().await {
                            CheckOutcome::LoggedOut | CheckOutcome::NoSession => break,
                            _ => {
                                self.state.send_replace(SchedulerState::Armed);
                            }
                        }
                    }
                    changed = session.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        if session.borrow_and_update().refresh_token().is_none() {
                            debug!("Refresh token cleared, disarming scheduler");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Owns the running timer loop. Dropping it cancels the loop, so teardown
/// happens on every exit path, not only through [`SchedulerHandle::stop`].
pub struct SchedulerHandle {
    task: Option<JoinHandle<()>>,
    state: Arc<watch::Sender<SchedulerState>>,
}

impl SchedulerHandle {
    /// Cancel the timer loop and wait for it to finish unwinding.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.state.send_replace(SchedulerState::Idle);
        info!("Renewal scheduler stopped");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.state.send_replace(SchedulerState::Idle);
        }
    }
}
