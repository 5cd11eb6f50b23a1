//! The single source of truth for the session credential.
//!
//! The store is an explicit, cloneable handle (not a global). Every mutation
//! is applied under the watch channel's write lock and written through to the
//! configured [`SnapshotStorage`] before the lock is released, so any later
//! read sees either the whole mutation or none of it.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::persist::{MemoryStorage, SnapshotStorage};

/// The persisted session record.
///
/// Either empty (logged out) or populated (both tokens present and
/// `is_authenticated` set). Empty strings stand for "no token".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub access_issued_at: Option<DateTime<Utc>>,
    pub refresh_issued_at: Option<DateTime<Utc>>,
    pub is_authenticated: bool,
}

impl SessionCredential {
    pub fn access_token(&self) -> Option<&str> {
        Some(self.access_token.as_str()).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        Some(self.refresh_token.as_str()).filter(|t| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_populated(&self) -> bool {
        self.is_authenticated && self.access_token().is_some() && self.refresh_token().is_some()
    }
}

/// Access/refresh pair returned by login, signup, provider login and renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// On-disk shape. Fields owned by other features ride along in `extra`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    access_issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    refresh_issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_authenticated: bool,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Snapshot {
    fn into_parts(self) -> (SessionCredential, Map<String, Value>) {
        let credential = SessionCredential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            access_issued_at: self.access_issued_at,
            refresh_issued_at: self.refresh_issued_at,
            is_authenticated: self.is_authenticated,
        };
        (credential, self.extra)
    }
}

struct Inner {
    state: watch::Sender<SessionCredential>,
    extra: Mutex<Map<String, Value>>,
    storage: Box<dyn SnapshotStorage>,
}

/// Shared handle to the session credential. Clone is cheap.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

impl CredentialStore {
    /// Open the store, reading the persisted snapshot once.
    ///
    /// Unreadable or half-populated snapshots start the process logged out.
    pub fn open(storage: Box<dyn SnapshotStorage>) -> Self {
        let (credential, extra) = match storage.load() {
            Ok(Some(raw)) => match serde_json::from_str::<Snapshot>(&raw) {
                Ok(snapshot) => snapshot.into_parts(),
                Err(e) => {
                    warn!(error = %e, "Failed to parse session snapshot, starting logged out");
                    Default::default()
                }
            },
            Ok(None) => Default::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load session snapshot, starting logged out");
                Default::default()
            }
        };

        let credential = if credential.is_populated() || credential.is_empty() {
            credential
        } else {
            warn!("Discarding partial session snapshot");
            SessionCredential::default()
        };
        debug!(authenticated = credential.is_authenticated, "Session store opened");

        let (state, _) = watch::channel(credential);
        Self {
            inner: Arc::new(Inner {
                state,
                extra: Mutex::new(extra),
                storage,
            }),
        }
    }

    /// A store with nothing persisted beyond this process.
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryStorage::new()))
    }

    /// Copy of the current credential.
    pub fn snapshot(&self) -> SessionCredential {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every change to the credential.
    pub fn subscribe(&self) -> watch::Receiver<SessionCredential> {
        self.inner.state.subscribe()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.state.borrow().access_token().map(str::to_string)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.state.borrow().refresh_token().map(str::to_string)
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.mutate(|c| c.access_token = token);
    }

    pub fn set_refresh_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.mutate(|c| c.refresh_token = token);
    }

    pub fn set_access_issued_at(&self, at: Option<DateTime<Utc>>) {
        self.mutate(|c| c.access_issued_at = at);
    }

    pub fn set_refresh_issued_at(&self, at: Option<DateTime<Utc>>) {
        self.mutate(|c| c.refresh_issued_at = at);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.mutate(|c| c.is_authenticated = authenticated);
    }

    /// Populate the whole session from a fresh login in one step.
    pub fn establish(&self, pair: TokenPair, now: DateTime<Utc>) {
        self.mutate(|c| {
            *c = SessionCredential {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
                access_issued_at: Some(now),
                refresh_issued_at: Some(now),
                is_authenticated: true,
            };
        });
        debug!("Session established");
    }

    /// Swap in a renewed pair, but only if the session still holds
    /// `expected_refresh`. Returns whether the pair was committed.
    pub fn commit_renewal(&self, expected_refresh: &str, pair: TokenPair, now: DateTime<Utc>) -> bool {
        let committed = self.inner.state.send_if_modified(|c| {
            if c.refresh_token != expected_refresh || expected_refresh.is_empty() {
                return false;
            }
            c.access_token = pair.access_token;
            c.refresh_token = pair.refresh_token;
            c.access_issued_at = Some(now);
            c.refresh_issued_at = Some(now);
            c.is_authenticated = true;
            self.persist(c);
            true
        });
        if !committed {
            debug!("Renewed tokens discarded, session changed while renewing");
        }
        committed
    }

    /// Return to the empty state. Calling it again changes nothing.
    pub fn reset_all(&self) {
        let changed = self.inner.state.send_if_modified(|c| {
            if c.is_empty() {
                return false;
            }
            *c = SessionCredential::default();
            self.erase();
            true
        });
        if changed {
            debug!("Session reset");
        }
    }

    fn mutate(&self, f: impl FnOnce(&mut SessionCredential)) {
        self.inner.state.send_modify(|c| {
            f(c);
            self.persist(c);
        });
    }

    /// Drop the stored record, or blank the credential fields when other
    /// features still keep data in it.
    fn erase(&self) {
        let has_extra = !self
            .inner
            .extra
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if has_extra {
            self.persist(&SessionCredential::default());
        } else if let Err(e) = self.inner.storage.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }

    fn persist(&self, credential: &SessionCredential) {
        let extra = self
            .inner
            .extra
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let snapshot = Snapshot {
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            access_issued_at: credential.access_issued_at,
            refresh_issued_at: credential.refresh_issued_at,
            is_authenticated: credential.is_authenticated,
            extra,
        };
        let result = serde_json::to_string_pretty(&snapshot)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.inner.storage.save(&raw));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session");
        }
    }
}
