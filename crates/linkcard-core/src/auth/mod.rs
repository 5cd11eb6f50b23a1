//! Session and credential lifecycle.
//!
//! This module provides:
//! - `claims`: pure decoding/validation of bearer tokens
//! - `CredentialStore`: the persisted session record
//! - `TokenRenewer`: single-flight refresh-token exchange
//! - `RenewalScheduler`: proactive renewal ahead of expiry
//! - `AuthFlows`: login, signup, provider login and logout

pub mod claims;
mod error;
mod flows;
mod logout;
pub mod persist;
mod renewal;
mod scheduler;
mod store;

pub use claims::Claims;
pub use error::SessionError;
pub use flows::AuthFlows;
pub use logout::ForcedLogout;
pub use persist::{FileStorage, KeyringStorage, MemoryStorage, SnapshotStorage, SESSION_STORAGE_KEY};
pub use renewal::TokenRenewer;
pub use scheduler::{CheckOutcome, RenewalScheduler, SchedulerHandle, SchedulerSettings, SchedulerState};
pub use store::{CredentialStore, SessionCredential, TokenPair};
