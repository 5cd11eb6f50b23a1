//! Sign-in entry points that create a session, and sign-out.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use super::{CredentialStore, TokenPair};
use crate::api::{ApiError, ApiRequest, HttpTransport};
use crate::clock::Clock;

const LOGIN_PATH: &str = "/auth/login";
const SIGNUP_PATH: &str = "/auth/signup";
const PROVIDER_LOGIN_PATH: &str = "/auth/provider";

/// Login, signup and provider login all answer with a token pair that
/// becomes the new session.
///
/// These calls go straight to the transport: they carry no bearer and a 401
/// here means bad credentials, not an expired session.
pub struct AuthFlows {
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
}

impl AuthFlows {
    pub fn new(transport: Arc<dyn HttpTransport>, store: CredentialStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            store,
            clock,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(LOGIN_PATH, json!({ "email": email, "password": password }));
        self.exchange(request).await
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(
            SIGNUP_PATH,
            json!({ "name": name, "email": email, "password": password }),
        );
        self.exchange(request).await
    }

    /// Sign in with an identity token from an external provider (e.g. `google`).
    pub async fn provider_login(&self, provider: &str, id_token: &str) -> Result<(), ApiError> {
        let path = format!("{}/{}", PROVIDER_LOGIN_PATH, provider);
        self.exchange(ApiRequest::post(path, json!({ "idToken": id_token }))).await
    }

    pub fn logout(&self) {
        self.store.reset_all();
        info!("Logged out");
    }

    async fn exchange(&self, request: ApiRequest) -> Result<(), ApiError> {
        let response = self.transport.send(&request).await?;
        if !response.status.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }

        let pair: TokenPair = response.json()?;
        if pair.access_token.is_empty() || pair.refresh_token.is_empty() {
            return Err(ApiError::InvalidResponse("Sign-in response is missing tokens".to_string()));
        }
        self.store.establish(pair, self.clock.now());
        info!(path = %request.path, "Signed in");
        Ok(())
    }
}
