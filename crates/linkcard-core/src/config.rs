//! Application configuration management.
//!
//! Configuration is stored at `~/.config/linkcard/config.json`; a missing
//! file means defaults. A few values can be overridden from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileStorage, KeyringStorage, SchedulerSettings, SnapshotStorage, SESSION_STORAGE_KEY};
use crate::navigation::Routes;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "linkcard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_URL: &str = "LINKCARD_API_URL";
const ENV_SESSION_BACKEND: &str = "LINKCARD_SESSION_BACKEND";

/// Where the session snapshot is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    File,
    Keyring,
}

impl std::str::FromStr for SessionBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(SessionBackend::File),
            "keyring" => Ok(SessionBackend::Keyring),
            other => Err(anyhow::anyhow!("Unknown session backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub renewal_path: String,
    pub onboarding_status_path: String,
    /// Seconds between proactive token health checks
    pub check_interval_secs: u64,
    /// Renew when the access token has this many seconds left or fewer
    pub renewal_window_secs: i64,
    pub request_timeout_secs: u64,
    pub login_route: String,
    pub home_route: String,
    pub session_backend: SessionBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            renewal_path: "/auth/refresh-token".to_string(),
            onboarding_status_path: "/onboarding/status".to_string(),
            check_interval_secs: 5 * 60,
            renewal_window_secs: 10 * 60,
            request_timeout_secs: 30,
            login_route: "/login".to_string(),
            home_route: "/dashboard".to_string(),
            session_backend: SessionBackend::File,
            last_email: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path).context("Failed to read config file")?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `LINKCARD_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_SESSION_BACKEND).ok(),
        )
    }

    fn apply_overrides(&mut self, api_url: Option<String>, backend: Option<String>) -> Result<()> {
        if let Some(url) = api_url.filter(|u| !u.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(backend) = backend {
            self.session_backend = backend
                .parse()
                .with_context(|| format!("Invalid {}", ENV_SESSION_BACKEND))?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn session_storage(&self) -> Result<Box<dyn SnapshotStorage>> {
        Ok(match self.session_backend {
            SessionBackend::File => Box::new(FileStorage::new(self.cache_dir()?, SESSION_STORAGE_KEY)),
            SessionBackend::Keyring => Box::new(KeyringStorage::new(SESSION_STORAGE_KEY)?),
        })
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            check_interval: Duration::from_secs(self.check_interval_secs),
            renewal_window: chrono::Duration::seconds(self.renewal_window_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn routes(&self) -> Routes {
        Routes {
            login: self.login_route.clone(),
            home: self.home_route.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"apiBaseUrl":"ignored","home_route":"/me"}"#)
            .expect("parse");
        assert_eq!(config.home_route, "/me");
        assert_eq!(config.check_interval_secs, 300);
        assert_eq!(config.scheduler_settings().renewal_window, chrono::Duration::minutes(10));
        assert_eq!(config.session_backend, SessionBackend::File);
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(Some("https://api.example.com".to_string()), Some("Keyring".to_string()))
            .expect("valid overrides");
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.session_backend, SessionBackend::Keyring);

        assert!(config.apply_overrides(None, Some("floppy".to_string())).is_err());
    }

    #[test]
    fn test_routes_from_config() {
        let routes = Config::default().routes();
        assert_eq!(routes, Routes::default());
    }
}
