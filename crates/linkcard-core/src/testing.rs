//! Fakes and builders shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::api::{ApiClient, ApiError, ApiRequest, ApiResponse, AuthInterceptor, HttpTransport};
use crate::auth::{
    AuthFlows, CredentialStore, ForcedLogout, RenewalScheduler, SchedulerSettings, TokenPair, TokenRenewer,
};
use crate::clock::Clock;
use crate::guard::{NextScreen, OnboardingStatus, OnboardingStatusSource, ProtectedGuard, PublicGuard};
use crate::navigation::{Navigator, Routes};

pub(crate) const RENEWAL_PATH: &str = "/auth/refresh-token";
pub(crate) const ONBOARDING_PATH: &str = "/onboarding/status";

/// Upper bound on polling loops so a broken test fails instead of hanging.
const MAX_POLLS: usize = 10_000;

pub(crate) fn at(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).expect("timestamp in range")
}

pub(crate) fn token_with(payload: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, body)
}

pub(crate) fn token_expiring_at(exp_secs: i64) -> String {
    token_with(json!({ "sub": "user-1", "iat": exp_secs - 3600, "exp": exp_secs }))
}

/// Let spawned tasks run until they block.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

pub(crate) struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
pub(crate) struct RecordingNavigator(Mutex<Vec<String>>);

impl RecordingNavigator {
    pub(crate) fn paths(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.0.lock().unwrap().push(path.to_string());
    }
}

/// Holds a fake's responses until released.
pub(crate) struct Gate(Arc<Semaphore>);

impl Gate {
    fn new() -> (Self, Arc<Semaphore>) {
        let semaphore = Arc::new(Semaphore::new(0));
        (Self(Arc::clone(&semaphore)), semaphore)
    }

    pub(crate) fn release(&self) {
        self.0.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

async fn pass(gate: Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        let _permit = gate.acquire().await.expect("gate open");
    }
}

enum Scripted {
    Respond(ApiResponse),
    Fail(String),
}

/// Transport answering from per-path scripts and recording every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fallback: Mutex<HashMap<String, ApiResponse>>,
    sent: Mutex<Vec<ApiRequest>>,
    renewal_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedTransport {
    fn enqueue(&self, path: &str, item: Scripted) {
        self.queued
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(item);
    }

    pub(crate) fn push(&self, path: &str, status: StatusCode, body: &str) {
        self.enqueue(path, Scripted::Respond(ApiResponse::new(status, body)));
    }

    /// Answer `path` with this response whenever nothing is queued.
    pub(crate) fn always(&self, path: &str, status: StatusCode, body: &str) {
        self.fallback
            .lock()
            .unwrap()
            .insert(path.to_string(), ApiResponse::new(status, body));
    }

    pub(crate) fn push_network_error(&self, path: &str) {
        self.enqueue(path, Scripted::Fail("connection refused".to_string()));
    }

    pub(crate) fn push_renewal_ok(&self, access: &str, refresh: &str) {
        let pair = TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        };
        let body = serde_json::to_string(&pair).unwrap();
        self.push(RENEWAL_PATH, StatusCode::OK, &body);
    }

    pub(crate) fn push_renewal_status(&self, status: StatusCode) {
        self.push(RENEWAL_PATH, status, "");
    }

    pub(crate) fn push_renewal_body(&self, status: StatusCode, body: &str) {
        self.push(RENEWAL_PATH, status, body);
    }

    pub(crate) fn push_renewal_network_error(&self) {
        self.push_network_error(RENEWAL_PATH);
    }

    /// Renewal requests wait until the returned gate is released.
    pub(crate) fn hold_renewals(&self) -> Gate {
        let (gate, semaphore) = Gate::new();
        *self.renewal_gate.lock().unwrap() = Some(semaphore);
        gate
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    pub(crate) async fn wait_for_requests(&self, path: &str, count: usize) {
        for _ in 0..MAX_POLLS {
            if self.requests_to(path).len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} requests to {}", count, path);
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.sent.lock().unwrap().push(request.clone());

        if request.path == RENEWAL_PATH {
            let gate = self.renewal_gate.lock().unwrap().clone();
            pass(gate).await;
        }

        let next = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(ApiError::Network(message)),
            None => Ok(self
                .fallback
                .lock()
                .unwrap()
                .get(&request.path)
                .cloned()
                .unwrap_or_else(|| ApiResponse::new(StatusCode::NOT_FOUND, "unscripted"))),
        }
    }
}

pub(crate) struct StubOnboarding {
    answer: Option<NextScreen>,
    calls: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl StubOnboarding {
    pub(crate) fn answering(next_screen: NextScreen) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(next_screen),
            calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
        })
    }

    pub(crate) fn hold(&self) -> Gate {
        let (gate, semaphore) = Gate::new();
        *self.gate.lock().unwrap() = Some(semaphore);
        gate
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OnboardingStatusSource for StubOnboarding {
    async fn onboarding_status(&self) -> Result<OnboardingStatus, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        pass(gate).await;
        match &self.answer {
            Some(next_screen) => Ok(OnboardingStatus {
                next_screen: next_screen.clone(),
            }),
            None => Err(ApiError::ServerError("onboarding unavailable".to_string())),
        }
    }
}

/// A store, fakes and the components wired over them.
pub(crate) struct Fixture {
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) store: CredentialStore,
    pub(crate) transport: Arc<ScriptedTransport>,
    pub(crate) navigator: Arc<RecordingNavigator>,
    pub(crate) renewer: TokenRenewer,
    pub(crate) logout: ForcedLogout,
    pub(crate) access: String,
    pub(crate) refresh: String,
}

impl Fixture {
    pub(crate) fn with_tokens(now: DateTime<Utc>, access: String, refresh: String) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let store = CredentialStore::in_memory();
        if !access.is_empty() && !refresh.is_empty() {
            store.establish(
                TokenPair {
                    access_token: access.clone(),
                    refresh_token: refresh.clone(),
                },
                now,
            );
        }
        let transport = Arc::new(ScriptedTransport::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let renewer = TokenRenewer::new(transport.clone(), store.clone(), clock.clone(), RENEWAL_PATH);
        let logout = ForcedLogout::new(store.clone(), navigator.clone(), Routes::default().login);

        Self {
            clock,
            store,
            transport,
            navigator,
            renewer,
            logout,
            access,
            refresh,
        }
    }

    /// Access token good for an hour, refresh token for a week.
    pub(crate) fn logged_in(now: DateTime<Utc>) -> Self {
        let secs = now.timestamp();
        Self::with_tokens(
            now,
            token_expiring_at(secs + 3600),
            token_expiring_at(secs + 7 * 24 * 3600),
        )
    }

    pub(crate) fn logged_out(now: DateTime<Utc>) -> Self {
        Self::with_tokens(now, String::new(), String::new())
    }

    pub(crate) fn scheduler(&self) -> RenewalScheduler {
        RenewalScheduler::new(
            self.store.clone(),
            self.renewer.clone(),
            self.clock.clone(),
            self.logout.clone(),
            SchedulerSettings::default(),
        )
    }

    pub(crate) fn interceptor(&self) -> AuthInterceptor {
        AuthInterceptor::new(
            self.transport.clone(),
            self.store.clone(),
            self.renewer.clone(),
            self.logout.clone(),
        )
    }

    pub(crate) fn client(&self) -> ApiClient {
        ApiClient::new(self.interceptor(), ONBOARDING_PATH)
    }

    pub(crate) fn flows(&self) -> AuthFlows {
        AuthFlows::new(self.transport.clone(), self.store.clone(), self.clock.clone())
    }

    pub(crate) fn protected_guard(&self) -> ProtectedGuard {
        ProtectedGuard::new(self.store.clone(), self.clock.clone(), Routes::default())
    }

    pub(crate) fn public_guard(&self, onboarding: Arc<dyn OnboardingStatusSource>) -> PublicGuard {
        PublicGuard::new(self.store.clone(), self.clock.clone(), Routes::default(), onboarding)
    }
}
