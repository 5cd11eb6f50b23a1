use std::sync::Arc;

use tracing::warn;

use super::{CredentialStore, SessionError};
use crate::navigation::Navigator;

/// Ends the session after an unrecoverable failure: wipe the store, then
/// send the user to the login route. No error is persisted or shown.
#[derive(Clone)]
pub struct ForcedLogout {
    store: CredentialStore,
    navigator: Arc<dyn Navigator>,
    login_route: String,
}

impl ForcedLogout {
    pub fn new(store: CredentialStore, navigator: Arc<dyn Navigator>, login_route: impl Into<String>) -> Self {
        Self {
            store,
            navigator,
            login_route: login_route.into(),
        }
    }

    pub fn trigger(&self, reason: &SessionError) {
        warn!(reason = %reason, "Forcing logout");
        self.store.reset_all();
        self.navigator.redirect(&self.login_route);
    }
}
