//! The remote "where should this user go next" collaborator consulted by the
//! public guard.

use async_trait::async_trait;
use serde::Deserialize;

use crate::api::ApiError;

/// Sentinel the server uses once onboarding is finished.
const COMPLETED: &str = "COMPLETED";

/// Next onboarding screen for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum NextScreen {
    Completed,
    Step(String),
}

impl From<String> for NextScreen {
    fn from(value: String) -> Self {
        if value == COMPLETED {
            NextScreen::Completed
        } else {
            NextScreen::Step(value)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingStatus {
    pub next_screen: NextScreen,
}

impl OnboardingStatus {
    pub fn is_completed(&self) -> bool {
        self.next_screen == NextScreen::Completed
    }
}

#[async_trait]
pub trait OnboardingStatusSource: Send + Sync {
    async fn onboarding_status(&self) -> Result<OnboardingStatus, ApiError>;
}
