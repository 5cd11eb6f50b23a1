//! Where the shell sends the user when the session gates a route.

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Route paths the session subsystem redirects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub login: String,
    pub home: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            home: "/dashboard".to_string(),
        }
    }
}

/// Hard navigation performed outside of a guard evaluation.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Forwards redirects to whoever owns the shell's event loop.
#[derive(Clone)]
pub struct ChannelNavigator {
    tx: mpsc::Sender<String>,
}

impl ChannelNavigator {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Navigator for ChannelNavigator {
    fn redirect(&self, path: &str) {
        debug!(path, "Redirect requested");
        if let Err(e) = self.tx.try_send(path.to_string()) {
            warn!(error = %e, path, "Failed to deliver redirect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_navigator_delivers_paths() {
        let (tx, mut rx) = mpsc::channel(4);
        let navigator = ChannelNavigator::new(tx);
        navigator.redirect("/login");
        assert_eq!(rx.recv().await.as_deref(), Some("/login"));
    }
}
