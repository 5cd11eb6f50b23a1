//! Exchange of a refresh token for a new token pair, shared between every
//! caller that needs it at the same time.
//!
//! Both the scheduler and the interceptor renew through one [`TokenRenewer`].
//! While an exchange is in flight, further callers await the same outcome
//! instead of issuing a second network call. The exchange runs on its own
//! task, so it completes (and commits) even if every waiter goes away.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{CredentialStore, SessionError, TokenPair};
use crate::api::{ApiRequest, HttpTransport};
use crate::clock::Clock;

type RenewalOutcome = Result<TokenPair, SessionError>;
type SharedRenewal = Shared<BoxFuture<'static, RenewalOutcome>>;

struct RenewerInner {
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    renewal_path: String,
    in_flight: Mutex<Option<SharedRenewal>>,
}

/// Single-flight token renewal. Clone is cheap.
#[derive(Clone)]
pub struct TokenRenewer {
    inner: Arc<RenewerInner>,
}

impl TokenRenewer {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: CredentialStore,
        clock: Arc<dyn Clock>,
        renewal_path: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(RenewerInner {
                transport,
                store,
                clock,
                renewal_path: renewal_path.into(),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Renew the session's token pair, joining any renewal already running.
    pub async fn renew(&self) -> RenewalOutcome {
        let renewal = {
            let mut slot = self.lock_slot();
            match slot.as_ref() {
                Some(running) if running.peek().is_none() => {
                    debug!("Joining in-flight renewal");
                    running.clone()
                }
                _ => {
                    let fresh = self.spawn_exchange();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };

        let outcome = renewal.clone().await;

        let mut slot = self.lock_slot();
        if slot.as_ref().is_some_and(|s| s.ptr_eq(&renewal)) {
            *slot = None;
        }
        outcome
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<SharedRenewal>> {
        self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_exchange(&self) -> SharedRenewal {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.exchange().await });
        async move {
            task.await.unwrap_or_else(|e| {
                Err(SessionError::RefreshTransient(format!("Renewal task failed: {}", e)))
            })
        }
        .boxed()
        .shared()
    }
}

impl RenewerInner {
    async fn exchange(&self) -> RenewalOutcome {
        let refresh = self.store.refresh_token().ok_or(SessionError::NoSession)?;
        let request = ApiRequest::post(&self.renewal_path, json!({ "refreshToken": refresh }));

        let response = self.transport.send(&request).await.map_err(|e| {
            warn!(error = %e, "Renewal request failed");
            SessionError::RefreshTransient(e.to_string())
        })?;

        if response.is_auth_failure() {
            return Err(SessionError::RefreshRejected(response.status.as_u16()));
        }
        if !response.status.is_success() {
            warn!(status = %response.status, "Renewal endpoint returned an error");
            return Err(SessionError::RefreshTransient(format!("Status {}", response.status)));
        }

        let pair: TokenPair = response
            .json()
            .map_err(|e| SessionError::RefreshTransient(e.to_string()))?;
        if pair.access_token.is_empty() || pair.refresh_token.is_empty() {
            return Err(SessionError::RefreshTransient(
                "Renewal response is missing tokens".to_string(),
            ));
        }

        if !self.store.commit_renewal(&refresh, pair.clone(), self.clock.now()) {
            return Err(SessionError::Superseded);
        }
        info!("Session tokens renewed");
        Ok(pair)
    }
}
