use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::{assess, GuardDecision, GuardPhase, SessionHealth};
use crate::auth::CredentialStore;
use crate::clock::Clock;
use crate::navigation::Routes;

/// Gate for pages that need a signed-in user.
pub struct ProtectedGuard {
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    routes: Routes,
    phase: watch::Sender<GuardPhase>,
}

impl ProtectedGuard {
    pub fn new(store: CredentialStore, clock: Arc<dyn Clock>, routes: Routes) -> Self {
        let (phase, _) = watch::channel(GuardPhase::Validating);
        Self {
            store,
            clock,
            routes,
            phase,
        }
    }

    pub fn phase(&self) -> GuardPhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GuardPhase> {
        self.phase.subscribe()
    }

    /// Decide whether protected content may render.
    ///
    /// An expired access token with a usable refresh token still renders;
    /// the interceptor heals it on the next call.
    pub fn evaluate(&self) -> GuardDecision {
        self.phase.send_replace(GuardPhase::Validating);

        let decision = match assess(&self.store.snapshot(), self.clock.now()) {
            SessionHealth::Anonymous => GuardDecision::Redirect(self.routes.login.clone()),
            SessionHealth::Broken(reason) => {
                debug!(reason = %reason, "Clearing unusable session before redirecting to login");
                self.store.reset_all();
                GuardDecision::Redirect(self.routes.login.clone())
            }
            SessionHealth::Valid | SessionHealth::Recoverable => GuardDecision::Render,
        };

        self.phase.send_replace(GuardPhase::Settled(decision.clone()));
        decision
    }
}
