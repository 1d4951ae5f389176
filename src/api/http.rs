//! `reqwest` implementation of [`AccountApi`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

use super::{AccountApi, ReEnableResponse};
use crate::config::AccountApiConfig;
use crate::error::ApiError;

const USER_AGENT: &str = "renge/2.0";

#[derive(Serialize)]
struct StaffReEnable<'a> {
    enabler: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Serialize)]
struct NewPaste<'a> {
    name: &'a str,
    passphrase: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct PasteResponse {
    success: bool,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpAccountApi {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpAccountApi {
    pub fn new(config: &AccountApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.url, path);
        trace!(url = %url, "Account API POST");
        let response = self
            .client
            .post(&url)
            .query(&[("authKey", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;
        let status = response.status();
        trace!(url = %url, status = status.as_u16(), "Account API response");
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AccountApi for HttpAccountApi {
    async fn reenable_anonymous(&self, username: &str) -> Result<ReEnableResponse, ApiError> {
        let empty = serde_json::Map::new();
        self.post(&format!("/api/reenable/{username}/user"), &empty)
            .await
    }

    async fn reenable_as_staff(
        &self,
        username: &str,
        enabler: &str,
        reason: Option<&str>,
    ) -> Result<ReEnableResponse, ApiError> {
        self.post(
            &format!("/api/reenable/{username}/staff"),
            &StaffReEnable { enabler, reason },
        )
        .await
    }

    async fn create_paste(
        &self,
        name: &str,
        body: &str,
        passphrase: &str,
    ) -> Result<String, ApiError> {
        let response: PasteResponse = self
            .post(
                "/api/pastes/create",
                &NewPaste {
                    name,
                    passphrase,
                    body,
                },
            )
            .await?;
        match (response.success, response.path) {
            (true, Some(path)) => Ok(format!("{}/pastes/{path}?passphrase={passphrase}", self.url)),
            _ => Err(ApiError::Paste(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> HttpAccountApi {
        HttpAccountApi::new(&AccountApiConfig {
            url: server.uri(),
            api_key: "secret".into(),
            timeout_secs: 30,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_reenable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/reenable/someone/user"))
            .and(query_param("authKey", "secret"))
            .and(header("user-agent", USER_AGENT))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "queue": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = api(&server).reenable_anonymous("someone").await.unwrap();
        assert_eq!(
            response,
            ReEnableResponse {
                success: false,
                queue: true,
                error: None
            }
        );
    }

    #[tokio::test]
    async fn test_staff_reenable_omits_missing_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/reenable/someone/staff"))
            .and(body_json(json!({ "enabler": "mod" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/reenable/other/staff"))
            .and(body_json(json!({ "enabler": "mod", "reason": "asked nicely" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "Account is banned"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = api(&server);
        assert!(api.reenable_as_staff("someone", "mod", None).await.unwrap().success);
        let response = api
            .reenable_as_staff("other", "mod", Some("asked nicely"))
            .await
            .unwrap();
        assert_eq!(response.error.as_deref(), Some("Account is banned"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let err = api(&server).reenable_anonymous("someone").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Received HTTP 502 from call to /api/reenable/someone/user"
        );
    }

    #[tokio::test]
    async fn test_create_paste_builds_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pastes/create"))
            .and(body_json(json!({
                "name": "log.log",
                "passphrase": "abc",
                "body": "line"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "path": "42"
            })))
            .mount(&server)
            .await;
        let url = api(&server).create_paste("log.log", "line", "abc").await.unwrap();
        assert_eq!(url, format!("{}/pastes/42?passphrase=abc", server.uri()));
    }

    #[tokio::test]
    async fn test_failed_paste_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pastes/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "too large"
            })))
            .mount(&server)
            .await;
        let err = api(&server).create_paste("n", "b", "p").await.unwrap_err();
        assert!(matches!(err, ApiError::Paste(ref e) if e == "too large"));
        assert_eq!(err.to_string(), "Error creating paste: too large");
    }
}
