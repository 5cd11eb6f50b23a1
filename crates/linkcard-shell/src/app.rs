//! Wires the session subsystem to the configured backend and runs the
//! shell's commands over it.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use linkcard_core::api::{HttpTransport, ReqwestTransport};
use linkcard_core::auth::{claims, AuthFlows, ForcedLogout};
use linkcard_core::{
    ApiClient, AuthInterceptor, ChannelNavigator, Clock, Config, CredentialStore, GuardDecision,
    ProtectedGuard, PublicGuard, RenewalScheduler, SystemClock, TokenRenewer,
};

/// Buffer size for redirects sent by background session work.
const CHANNEL_BUFFER_SIZE: usize = 16;

/// Public route served alongside the login route.
const SIGNUP_ROUTE: &str = "/signup";

/// Environment variable consulted before prompting for a password.
const ENV_PASSWORD: &str = "LINKCARD_PASSWORD";

pub struct App {
    config: Config,
    clock: Arc<dyn Clock>,
    store: CredentialStore,
    transport: Arc<dyn HttpTransport>,
    renewer: TokenRenewer,
    flows: AuthFlows,
}

impl App {
    pub fn new() -> Result<Self> {
        let mut config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        config.apply_env()?;
        debug!(api = %config.api_base_url, backend = ?config.session_backend, "Config loaded");

        let store = CredentialStore::open(config.session_storage()?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(config.api_base_url.clone(), config.request_timeout())?);
        let renewer = TokenRenewer::new(
            transport.clone(),
            store.clone(),
            clock.clone(),
            config.renewal_path.clone(),
        );
        let flows = AuthFlows::new(transport.clone(), store.clone(), clock.clone());

        Ok(Self {
            config,
            clock,
            store,
            transport,
            renewer,
            flows,
        })
    }

    fn forced_logout(&self, tx: mpsc::Sender<String>) -> ForcedLogout {
        ForcedLogout::new(
            self.store.clone(),
            Arc::new(ChannelNavigator::new(tx)),
            self.config.login_route.clone(),
        )
    }

    fn api_client(&self, logout: ForcedLogout) -> ApiClient {
        let interceptor = AuthInterceptor::new(
            self.transport.clone(),
            self.store.clone(),
            self.renewer.clone(),
            logout,
        );
        ApiClient::new(interceptor, self.config.onboarding_status_path.clone())
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&mut self, email: Option<String>) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        let password = password()?;

        self.flows
            .login(&email, &password)
            .await
            .context("Login failed")?;
        self.remember_email(email.clone());

        info!("Login successful");
        println!("Signed in as {}", email);
        Ok(())
    }

    pub async fn signup(&mut self, name: &str, email: &str) -> Result<()> {
        let password = password()?;

        self.flows
            .signup(name, email, &password)
            .await
            .context("Signup failed")?;
        self.remember_email(email.to_string());

        println!("Account created for {}", email);
        Ok(())
    }

    pub async fn provider_login(&self, provider: &str, id_token: &str) -> Result<()> {
        self.flows
            .provider_login(provider, id_token)
            .await
            .with_context(|| format!("Sign-in with {} failed", provider))?;

        println!("Signed in with {}", provider);
        Ok(())
    }

    pub fn logout(&self) {
        self.flows.logout();
        println!("Signed out");
    }

    fn remember_email(&mut self, email: String) {
        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn status(&self) {
        let session = self.store.snapshot();
        if session.is_empty() {
            println!("Not signed in");
            return;
        }

        let now = self.clock.now();
        println!("Authenticated: {}", session.is_authenticated);
        describe_token("Access token", session.access_token(), session.access_issued_at, now);
        describe_token("Refresh token", session.refresh_token(), session.refresh_issued_at, now);
    }

    /// Evaluate the guard that owns `route` and print its decision.
    pub async fn visit(&self, route: &str) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let routes = self.config.routes();

        let decision = if route == routes.login || route == SIGNUP_ROUTE {
            let onboarding = Arc::new(self.api_client(self.forced_logout(tx)));
            PublicGuard::new(self.store.clone(), self.clock.clone(), routes, onboarding)
                .evaluate()
                .await
        } else {
            drop(tx);
            ProtectedGuard::new(self.store.clone(), self.clock.clone(), routes).evaluate()
        };

        while let Ok(path) = rx.try_recv() {
            println!("Session ended, redirected to {}", path);
        }
        match decision {
            GuardDecision::Render => println!("{}: render", route),
            GuardDecision::Redirect(target) => println!("{}: redirect to {}", route, target),
        }
        Ok(())
    }

    // =========================================================================
    // Background renewal
    // =========================================================================

    /// Keep the session renewed until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let scheduler = RenewalScheduler::new(
            self.store.clone(),
            self.renewer.clone(),
            self.clock.clone(),
            self.forced_logout(tx),
            self.config.scheduler_settings(),
        );
        let mut session = self.store.subscribe();
        let handle = scheduler.start();

        println!("Keeping the session fresh, press Ctrl-C to stop");
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                    break;
                }
                Some(path) = rx.recv() => {
                    println!("Session ended, redirected to {}", path);
                }
                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let populated = session.borrow_and_update().is_populated();
                    info!(populated, state = ?scheduler.state(), "Session changed");
                }
            }
        }

        handle.stop().await;
        info!("Scheduler stopped");
        Ok(())
    }
}

fn describe_token(label: &str, token: Option<&str>, issued_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
    let Some(token) = token else {
        println!("{}: missing", label);
        return;
    };
    let Some(decoded) = claims::decode(token) else {
        println!("{}: malformed", label);
        return;
    };

    let remaining = decoded.time_until_expiry(now);
    let health = if claims::is_expired_at(token, now) {
        "expired".to_string()
    } else {
        format!("valid for {}m {}s", remaining.num_minutes(), remaining.num_seconds() % 60)
    };
    println!("{}: {} (subject {})", label, health, decoded.sub);
    if let Some(expires_at) = decoded.expires_at() {
        println!("  expires {}", expires_at.to_rfc3339());
    }
    if let Some(issued_at) = issued_at {
        println!("  stored {}", issued_at.to_rfc3339());
    }
    if !decoded.extra.is_empty() {
        match serde_json::to_string(&decoded.extra) {
            Ok(extra) => println!("  claims {}", extra),
            Err(e) => debug!(error = %e, "Failed to render extra claims"),
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn password() -> Result<String> {
    match std::env::var(ENV_PASSWORD) {
        Ok(password) if !password.is_empty() => Ok(password),
        _ => Ok(rpassword::prompt_password("Password: ")?),
    }
}
