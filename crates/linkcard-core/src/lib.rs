//! Session and credential lifecycle for the linkcard app shell.
//!
//! Issues, validates, proactively renews and reactively recovers short-lived
//! bearer credentials, and gates routes on the result.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod guard;
pub mod navigation;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, AuthInterceptor};
pub use auth::{CredentialStore, RenewalScheduler, SessionError, TokenRenewer};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use guard::{GuardDecision, GuardPhase, ProtectedGuard, PublicGuard};
pub use navigation::{ChannelNavigator, Navigator, Routes};
