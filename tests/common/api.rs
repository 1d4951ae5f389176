//! In-process stand-in for the account API.

use async_trait::async_trait;
use deskbot::api::{AccountApi, ReEnableResponse};
use deskbot::error::ApiError;
use parking_lot::Mutex;

/// Re-enables always fail; pastes succeed with sequential URLs.
#[derive(Default)]
pub struct ScriptedApi {
    pastes: Mutex<Vec<(String, String)>>,
}

impl ScriptedApi {
    /// `(name, body)` of every uploaded paste, oldest first.
    #[allow(dead_code)]
    pub fn pastes(&self) -> Vec<(String, String)> {
        self.pastes.lock().clone()
    }
}

#[async_trait]
impl AccountApi for ScriptedApi {
    async fn reenable_anonymous(&self, _username: &str) -> Result<ReEnableResponse, ApiError> {
        Ok(ReEnableResponse::default())
    }

    async fn reenable_as_staff(
        &self,
        _username: &str,
        _enabler: &str,
        _reason: Option<&str>,
    ) -> Result<ReEnableResponse, ApiError> {
        Ok(ReEnableResponse::default())
    }

    async fn create_paste(
        &self,
        name: &str,
        body: &str,
        passphrase: &str,
    ) -> Result<String, ApiError> {
        let mut pastes = self.pastes.lock();
        pastes.push((name.to_string(), body.to_string()));
        Ok(format!(
            "https://pastes.test/{}?passphrase={passphrase}",
            pastes.len()
        ))
    }
}
