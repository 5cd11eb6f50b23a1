//! Typed JSON access to the backend, on top of the auth interceptor.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use super::{ApiError, ApiRequest, ApiResponse, AuthInterceptor};
use crate::guard::{OnboardingStatus, OnboardingStatusSource};

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the card builder backend. Every call goes through the
/// [`AuthInterceptor`]. Clone is cheap.
#[derive(Clone)]
pub struct ApiClient {
    interceptor: AuthInterceptor,
    onboarding_status_path: String,
}

impl ApiClient {
    pub fn new(interceptor: AuthInterceptor, onboarding_status_path: impl Into<String>) -> Self {
        Self {
            interceptor,
            onboarding_status_path: onboarding_status_path.into(),
        }
    }

    /// Send a request, backing off on 429 and mapping failures to [`ApiError`].
    ///
    /// Backoff attempts belong to one logical call: the session is renewed
    /// for it at most once.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.interceptor.send(&mut request).await?;
            if response.status.is_success() {
                return Ok(response);
            }
            if response.status != StatusCode::TOO_MANY_REQUESTS {
                return Err(ApiError::from_status(response.status, &response.body));
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(path = %request.path, retry = retries, backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.execute(ApiRequest::post(path, body)).await?.json()
    }

    pub async fn fetch_onboarding_status(&self) -> Result<OnboardingStatus, ApiError> {
        self.get(&self.onboarding_status_path).await
    }
}

#[async_trait]
impl OnboardingStatusSource for ApiClient {
    async fn onboarding_status(&self) -> Result<OnboardingStatus, ApiError> {
        self.fetch_onboarding_status().await
    }
}
