//! Bearer attachment and one-shot recovery for every outbound call.
//!
//! Each request gets the current access token. If the server answers 401 or
//! 403, the request is marked retried, the session is renewed once, and the
//! same request is resent with the new token. A second authorization failure
//! on a request that was already retried ends the session instead of
//! renewing again.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{ApiError, ApiRequest, ApiResponse, HttpTransport};
use crate::auth::{CredentialStore, ForcedLogout, SessionError, TokenRenewer};

#[derive(Clone)]
pub struct AuthInterceptor {
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    renewer: TokenRenewer,
    logout: ForcedLogout,
}

impl AuthInterceptor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: CredentialStore,
        renewer: TokenRenewer,
        logout: ForcedLogout,
    ) -> Self {
        Self {
            transport,
            store,
            renewer,
            logout,
        }
    }

    /// Send `request`, recovering once from an authorization failure.
    ///
    /// Responses other than 401/403 are returned untouched, whatever their
    /// status.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.send(&mut request).await
    }

    /// Like [`AuthInterceptor::execute`], but the retry mark stays on
    /// `request`, so resending the same value never renews a second time.
    pub(crate) async fn send(&self, request: &mut ApiRequest) -> Result<ApiResponse, ApiError> {
        if let Some(token) = self.store.access_token() {
            request.set_bearer(&token)?;
        }

        let mut response = self.transport.send(request).await?;
        while response.is_auth_failure() {
            if request.is_retried() {
                let error = SessionError::RetryExhausted;
                self.logout.trigger(&error);
                return Err(error.into());
            }
            request.mark_retried();
            debug!(path = %request.path, status = %response.status, "Authorization failed, renewing");

            let pair = match self.renewer.renew().await {
                Ok(pair) => pair,
                Err(SessionError::Superseded) => {
                    // The session this request belonged to is gone; leave the new one alone.
                    return Err(SessionError::Superseded.into());
                }
                Err(e) => {
                    warn!(error = %e, path = %request.path, "Renewal after authorization failure failed");
                    self.logout.trigger(&e);
                    return Err(e.into());
                }
            };

            request.set_bearer(&pair.access_token)?;
            response = self.transport.send(request).await?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenPair;
    use crate::testing::{at, Fixture, RENEWAL_PATH};
    use reqwest::StatusCode;

    const NOW_MS: i64 = 1_700_000_000_000;

    #[tokio::test]
    async fn test_attaches_current_access_token() {
        let fx = Fixture::logged_in(at(NOW_MS));
        fx.transport.push("/cards", StatusCode::OK, "[]");

        let response = fx.interceptor().execute(ApiRequest::get("/cards")).await.expect("ok");
        assert_eq!(response.status, StatusCode::OK);
        let sent = fx.transport.requests_to("/cards");
        assert_eq!(sent[0].bearer(), Some(fx.access.as_str()));
    }

    #[tokio::test]
    async fn test_no_header_without_session() {
        let fx = Fixture::logged_out(at(NOW_MS));
        fx.transport.push("/public/templates", StatusCode::OK, "[]");

        fx.interceptor()
            .execute(ApiRequest::get("/public/templates"))
            .await
            .expect("ok");
        assert!(fx.transport.requests_to("/public/templates")[0].bearer().is_none());
    }

    #[tokio::test]
    async fn test_other_statuses_pass_through() {
        let fx = Fixture::logged_in(at(NOW_MS));
        fx.transport.push("/cards/9", StatusCode::NOT_FOUND, "missing");
        fx.transport.push("/cards", StatusCode::INTERNAL_SERVER_ERROR, "boom");

        let interceptor = fx.interceptor();
        let not_found = interceptor.execute(ApiRequest::get("/cards/9")).await.expect("response");
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        let failed = interceptor.execute(ApiRequest::get("/cards")).await.expect("response");
        assert_eq!(failed.body, "boom");
        assert!(fx.transport.requests_to(RENEWAL_PATH).is_empty());
    }

    #[tokio::test]
    async fn test_renews_and_resubmits_once() {
        let fx = Fixture::logged_in(at(NOW_MS));
        fx.transport.push("/cards", StatusCode::UNAUTHORIZED, "");
        fx.transport.push_renewal_ok("a2", "r2");
        fx.transport.push("/cards", StatusCode::OK, "[1]");

        let response = fx.interceptor().execute(ApiRequest::get("/cards")).await.expect("recovered");
        assert_eq!(response.body, "[1]");

        let sent = fx.transport.requests_to("/cards");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].bearer(), Some("a2"));
        assert!(sent[1].is_retried());
        assert_eq!(fx.store.access_token().as_deref(), Some("a2"));
        assert!(fx.navigator.paths().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_e_second_failure_logs_out_without_second_renewal() {
        let fx = Fixture::logged_in(at(NOW_MS));
        fx.transport.always("/cards", StatusCode::UNAUTHORIZED, "");
        fx.transport.push_renewal_ok("a2", "r2");
        fx.transport.push_renewal_ok("a3", "r3");

        let err = fx.interceptor().execute(ApiRequest::get("/cards")).await.unwrap_err();
        assert!(matches!(err, ApiError::Session(SessionError::RetryExhausted)));
        assert!(err.ended_session());

        assert_eq!(fx.transport.requests_to(RENEWAL_PATH).len(), 1);
        assert_eq!(fx.transport.requests_to("/cards").len(), 2);
        assert!(fx.store.snapshot().is_empty());
        assert_eq!(fx.navigator.paths(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_forbidden_is_treated_like_unauthorized() {
        let fx = Fixture::logged_in(at(NOW_MS));
        fx.transport.push("/billing", StatusCode::FORBIDDEN, "");
        fx.transport.push_renewal_ok("a2", "r2");
        fx.transport.push("/billing", StatusCode::OK, "{}");

        fx.interceptor().execute(ApiRequest::get("/billing")).await.expect("recovered");
        assert_eq!(fx.transport.requests_to(RENEWAL_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_renewal_logs_out() {
        let fx = Fixture::logged_in(at(NOW_MS));
        fx.transport.push("/cards", StatusCode::UNAUTHORIZED, "");
        fx.transport.push_renewal_status(StatusCode::SERVICE_UNAVAILABLE);

        let err = fx.interceptor().execute(ApiRequest::get("/cards")).await.unwrap_err();
        assert!(matches!(err, ApiError::Session(SessionError::RefreshTransient(_))));
        assert_eq!(fx.transport.requests_to("/cards").len(), 1);
        assert!(fx.store.snapshot().is_empty());
        assert_eq!(fx.navigator.paths(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_retry_mark_does_not_leak_between_calls() {
        let fx = Fixture::logged_in(at(NOW_MS));
        let interceptor = fx.interceptor();

        fx.transport.push("/cards", StatusCode::UNAUTHORIZED, "");
        fx.transport.push_renewal_ok("a2", "r2");
        fx.transport.push("/cards", StatusCode::OK, "[]");
        interceptor.execute(ApiRequest::get("/cards")).await.expect("first call recovers");

        fx.transport.push("/cards", StatusCode::UNAUTHORIZED, "");
        fx.transport.push_renewal_ok("a3", "r3");
        fx.transport.push("/cards", StatusCode::OK, "[]");
        interceptor.execute(ApiRequest::get("/cards")).await.expect("second call recovers too");

        assert_eq!(fx.transport.requests_to(RENEWAL_PATH).len(), 2);
        assert_eq!(fx.store.access_token().as_deref(), Some("a3"));
    }

    #[tokio::test]
    async fn test_superseded_renewal_keeps_the_new_session() {
        let fx = Fixture::logged_in(at(NOW_MS));
        let gate = fx.transport.hold_renewals();
        fx.transport.push("/cards", StatusCode::UNAUTHORIZED, "");
        fx.transport.push_renewal_ok("a2", "r2");

        let pending = tokio::spawn({
            let interceptor = fx.interceptor();
            async move { interceptor.execute(ApiRequest::get("/cards")).await }
        });
        fx.transport.wait_for_requests(RENEWAL_PATH, 1).await;
        fx.store.establish(
            TokenPair {
                access_token: "a9".to_string(),
                refresh_token: "r9".to_string(),
            },
            at(NOW_MS),
        );
        gate.release();

        let err = pending.await.expect("join").unwrap_err();
        assert!(matches!(err, ApiError::Session(SessionError::Superseded)));
        assert!(!err.ended_session());
        assert_eq!(fx.store.access_token().as_deref(), Some("a9"));
        assert!(fx.store.is_authenticated());
        assert!(fx.navigator.paths().is_empty());
        assert_eq!(fx.transport.requests_to("/cards").len(), 1);
    }

    #[tokio::test]
    async fn test_network_errors_propagate_without_logout() {
        let fx = Fixture::logged_in(at(NOW_MS));
        fx.transport.push_network_error("/cards");

        let err = fx.interceptor().execute(ApiRequest::get("/cards")).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert!(fx.store.is_authenticated());
    }
}
