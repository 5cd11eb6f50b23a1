use thiserror::Error;

/// Failures in the session lifecycle.
///
/// `Clone` so a single renewal outcome can be handed to every caller that
/// was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Token is malformed")]
    MalformedToken,

    #[error("Credential has expired")]
    ExpiredCredential,

    #[error("Refresh rejected by server (status {0})")]
    RefreshRejected(u16),

    #[error("Refresh failed, will retry later: {0}")]
    RefreshTransient(String),

    #[error("Request still unauthorized after renewal")]
    RetryExhausted,

    #[error("No refresh token in session")]
    NoSession,

    #[error("Session was replaced while renewal was in flight")]
    Superseded,
}

impl SessionError {
    /// Whether this failure ends the current session.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::MalformedToken
            | SessionError::ExpiredCredential
            | SessionError::RefreshRejected(_)
            | SessionError::RetryExhausted
            | SessionError::NoSession => true,
            SessionError::RefreshTransient(_) | SessionError::Superseded => false,
        }
    }
}
