//! Route gating on session state.
//!
//! Guards start out validating (the shell shows a neutral loading state)
//! and settle on either rendering their content or redirecting.

mod onboarding;
mod protected;
mod public;

pub use onboarding::{NextScreen, OnboardingStatus, OnboardingStatusSource};
pub use protected::ProtectedGuard;
pub use public::PublicGuard;

use chrono::{DateTime, Utc};

use crate::auth::{claims, SessionCredential, SessionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    Redirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardPhase {
    Validating,
    /// Public guard only: waiting on the onboarding-status call
    CheckingOnboarding,
    Settled(GuardDecision),
}

impl GuardPhase {
    /// Nothing but a loading indicator may be shown in this phase.
    pub fn is_loading(&self) -> bool {
        !matches!(self, GuardPhase::Settled(_))
    }
}

/// How usable the stored session is for gating.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionHealth {
    /// Not signed in
    Anonymous,
    /// Signed in but unusable; must be cleared
    Broken(SessionError),
    Valid,
    /// Access token expired but the refresh token can heal it
    Recoverable,
}

fn assess(session: &SessionCredential, now: DateTime<Utc>) -> SessionHealth {
    if !session.is_authenticated {
        return SessionHealth::Anonymous;
    }
    let Some(access) = session.access_token().filter(|t| claims::is_valid_structure(t)) else {
        return SessionHealth::Broken(SessionError::MalformedToken);
    };
    if !claims::is_expired_at(access, now) {
        return SessionHealth::Valid;
    }
    match session.refresh_token() {
        Some(refresh) if !claims::is_valid_structure(refresh) => SessionHealth::Broken(SessionError::MalformedToken),
        Some(refresh) if !claims::is_expired_at(refresh, now) => SessionHealth::Recoverable,
        Some(_) => SessionHealth::Broken(SessionError::ExpiredCredential),
        None => SessionHealth::Broken(SessionError::MalformedToken),
    }
}
