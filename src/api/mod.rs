//! Account-management API.
//!
//! The site exposes account re-enabling and paste hosting over HTTP. The bot
//! only talks to it through [`AccountApi`] so tests can substitute a fake.

mod http;

pub use http::HttpAccountApi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Reply to a re-enable request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReEnableResponse {
    pub success: bool,
    /// The account cannot be re-enabled automatically and the user should
    /// be queued for staff instead.
    #[serde(default)]
    pub queue: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Self-service re-enable requested by the account owner.
    async fn reenable_anonymous(&self, username: &str) -> Result<ReEnableResponse, ApiError>;

    /// Re-enable performed by a staff member, identified by `enabler`.
    async fn reenable_as_staff(
        &self,
        username: &str,
        enabler: &str,
        reason: Option<&str>,
    ) -> Result<ReEnableResponse, ApiError>;

    /// Upload `body` as a passphrase-protected paste and return its URL.
    async fn create_paste(&self, name: &str, body: &str, passphrase: &str)
    -> Result<String, ApiError>;
}
