use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::{assess, GuardDecision, GuardPhase, OnboardingStatusSource, SessionHealth};
use crate::auth::CredentialStore;
use crate::clock::Clock;
use crate::navigation::Routes;

/// Gate for login/signup style pages: signed-in users who have finished
/// onboarding are sent to the app instead.
pub struct PublicGuard {
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    routes: Routes,
    onboarding: Arc<dyn OnboardingStatusSource>,
    phase: watch::Sender<GuardPhase>,
}

impl PublicGuard {
    pub fn new(
        store: CredentialStore,
        clock: Arc<dyn Clock>,
        routes: Routes,
        onboarding: Arc<dyn OnboardingStatusSource>,
    ) -> Self {
        let (phase, _) = watch::channel(GuardPhase::Validating);
        Self {
            store,
            clock,
            routes,
            onboarding,
            phase,
        }
    }

    pub fn phase(&self) -> GuardPhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GuardPhase> {
        self.phase.subscribe()
    }

    pub async fn evaluate(&self) -> GuardDecision {
        self.phase.send_replace(GuardPhase::Validating);

        let decision = match assess(&self.store.snapshot(), self.clock.now()) {
            SessionHealth::Anonymous => GuardDecision::Render,
            SessionHealth::Broken(reason) => {
                debug!(reason = %reason, "Clearing unusable session on public page");
                self.store.reset_all();
                GuardDecision::Render
            }
            SessionHealth::Valid | SessionHealth::Recoverable => {
                self.phase.send_replace(GuardPhase::CheckingOnboarding);
                match self.onboarding.onboarding_status().await {
                    Ok(status) if status.is_completed() => GuardDecision::Redirect(self.routes.home.clone()),
                    Ok(_) => GuardDecision::Render,
                    Err(e) => {
                        debug!(error = %e, "Onboarding status unavailable, rendering public page");
                        GuardDecision::Render
                    }
                }
            }
        };

        self.phase.send_replace(GuardPhase::Settled(decision.clone()));
        decision
    }
}
