// MIT License - Copyright (c) 2026 Peter Wright
// Authenticated session against the Sector Alarm cloud API

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Timeout for the credential login request.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout for every other request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Authenticated; carries the bearer token now in use.
    Success(String),
    /// Credentials accepted, a one-time code was sent out of band.
    TwoFactorRequired,
    Failed,
}

/// Arm modes accepted by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmMode {
    Total,
    Partial,
    Disarm,
}

impl ArmMode {
    /// Command name in the `/api/panel/{command}` path.
    pub fn command(self) -> &'static str {
        match self {
            ArmMode::Total => "Arm",
            ArmMode::Partial => "PartialArm",
            ArmMode::Disarm => "Disarm",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "AuthorizationToken", default)]
    authorization_token: Option<String>,
}

/// Credentials, bearer token and HTTP client for one panel.
///
/// Every public method swallows transport and protocol faults: they are
/// logged and reported as [`LoginOutcome::Failed`], `false` or `None`.
/// Callers treat those as "try again later".
pub struct CloudSession {
    base_url: String,
    email: String,
    password: SecretString,
    panel_id: String,
    token: Option<String>,
    http: Option<reqwest::Client>,
}

impl CloudSession {
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        panel_id: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: email.into(),
            password: SecretString::from(password.into()),
            panel_id: panel_id.into(),
            token: token.filter(|t| !t.is_empty()),
            http: None,
        }
    }

    /// Build a session from the current configuration, including any
    /// persisted token.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            &config.cloud.api_url,
            &config.cloud.email,
            &config.cloud.password,
            &config.cloud.panel_id,
            config.token().map(str::to_string),
        )
    }

    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Log in with the stored credentials.
    ///
    /// Unless `force` is set, an existing token is checked first and reused
    /// when still valid, so no new SMS challenge is triggered.
    pub async fn login(&mut self, force: bool) -> LoginOutcome {
        if !force && self.token.is_some() {
            if self.validate_token().await {
                debug!("Existing token still valid, skipping login");
                if let Some(token) = &self.token {
                    return LoginOutcome::Success(token.clone());
                }
            }
            debug!("Existing token rejected");
        }

        info!("Logging in to Sector Alarm as {}", self.email);
        let body = json!({
            "userId": self.email,
            "password": self.password.expose_secret(),
        });
        let response = match self.send_login("/api/Login/Login", &body).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Login request failed: {e}");
                return LoginOutcome::Failed;
            }
        };

        match response.status() {
            StatusCode::OK => match Self::read_token(response).await {
                Ok(token) => {
                    info!("Login succeeded");
                    self.token = Some(token.clone());
                    LoginOutcome::Success(token)
                }
                Err(e) => {
                    warn!("Login returned 200 without a usable token: {e}");
                    LoginOutcome::Failed
                }
            },
            StatusCode::NO_CONTENT => {
                info!("Login requires two-factor verification, code sent");
                LoginOutcome::TwoFactorRequired
            }
            StatusCode::UNAUTHORIZED => {
                warn!("Login rejected (401): wrong credentials");
                LoginOutcome::Failed
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                warn!("Login failed with HTTP {status}: {text}");
                LoginOutcome::Failed
            }
        }
    }

    /// Submit a one-time code. The API wants the credentials again
    /// alongside it.
    pub async fn validate_two_factor_code(&mut self, code: &str) -> bool {
        let body = json!({
            "UserId": self.email,
            "Password": self.password.expose_secret(),
            "Code": code.trim(),
        });
        let response = match self
            .send_login("/api/Login/ValidateTwoWayVerificationCode", &body)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("2FA request failed: {e}");
                return false;
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            warn!("2FA code rejected with HTTP {status}: {text}");
            return false;
        }
        match Self::read_token(response).await {
            Ok(token) => {
                info!("2FA accepted, token obtained");
                self.token = Some(token);
                true
            }
            Err(e) => {
                warn!("2FA response without a usable token: {e}");
                false
            }
        }
    }

    /// A token is valid iff an authenticated status fetch succeeds. There is
    /// no local expiry; every call is a live round-trip.
    pub async fn validate_token(&mut self) -> bool {
        if self.token.is_none() {
            return false;
        }
        self.get_panel_status().await.is_some()
    }

    pub async fn get_panel_status(&mut self) -> Option<Value> {
        let path = format!("/api/panel/GetPanelStatus?panelId={}", self.panel_id);
        self.get_logged(&path).await
    }

    pub async fn get_temperatures(&mut self) -> Option<Value> {
        let body = json!({ "PanelId": self.panel_id });
        self.post_logged("/api/v2/housecheck/temperatures", &body).await
    }

    pub async fn get_humidity(&mut self) -> Option<Value> {
        let path = format!("/api/housecheck/panels/{}/humidity", self.panel_id);
        self.get_logged(&path).await
    }

    /// Event log, newest entry first.
    pub async fn get_event_log(&mut self) -> Option<Value> {
        let path = format!("/api/panel/GetLogs?panelId={}", self.panel_id);
        self.get_logged(&path).await
    }

    /// Send an arm/disarm command. Returns whether the API accepted it.
    pub async fn arm_system(&mut self, code: &str, mode: ArmMode) -> bool {
        let path = format!("/api/panel/{}", mode.command());
        let body = json!({ "PanelCode": code, "PanelId": self.panel_id });
        let accepted = self.post_logged(&path, &body).await.is_some();
        if accepted {
            info!("Panel command {} accepted", mode.command());
        }
        accepted
    }

    /// Release the HTTP client. The next call creates a fresh one.
    pub fn close(&mut self) {
        if self.http.take().is_some() {
            debug!("Cloud session transport released");
        }
    }

    // --- transport ---

    fn client(&mut self) -> Result<reqwest::Client> {
        if let Some(client) = &self.http {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        self.http = Some(client.clone());
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send_login(&mut self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = self.url(path);
        debug!("POST {url}");
        let response = self
            .client()?
            .post(&url)
            .timeout(LOGIN_TIMEOUT)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    async fn read_token(response: reqwest::Response) -> Result<String> {
        let parsed: TokenResponse = response.json().await?;
        parsed
            .authorization_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BridgeError::InvalidResponse {
                details: "missing AuthorizationToken".to_string(),
            })
    }

    fn authorized(
        &mut self,
        builder: impl FnOnce(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        let token = self.token.clone().ok_or(BridgeError::NotAuthenticated)?;
        let client = self.client()?;
        Ok(builder(&client)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json"))
    }

    async fn get(&mut self, path: &str) -> Result<Value> {
        let url = self.url(path);
        let response = self.authorized(|c| c.get(&url))?.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(BridgeError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.json().await?)
    }

    async fn post(&mut self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        let response = self.authorized(|c| c.post(&url).json(body))?.send().await?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(BridgeError::Status {
                status: status.as_u16(),
                url,
            });
        }
        // Command endpoints may answer with an empty body.
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::Bool(true)))
    }

    async fn get_logged(&mut self, path: &str) -> Option<Value> {
        match self.get(path).await {
            Ok(value) => Some(value),
            Err(e) => {
                log_failure("GET", path, &e);
                None
            }
        }
    }

    async fn post_logged(&mut self, path: &str, body: &Value) -> Option<Value> {
        match self.post(path, body).await {
            Ok(value) => Some(value),
            Err(e) => {
                log_failure("POST", path, &e);
                None
            }
        }
    }
}

fn log_failure(verb: &str, path: &str, e: &BridgeError) {
    if e.is_transient() {
        warn!("{verb} {path} failed, will retry: {e}");
    } else {
        error!("{verb} {path} failed: {e}");
    }
}

impl Drop for CloudSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CloudSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSession")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("panel_id", &self.panel_id)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_mode_commands() {
        assert_eq!(ArmMode::Total.command(), "Arm");
        assert_eq!(ArmMode::Partial.command(), "PartialArm");
        assert_eq!(ArmMode::Disarm.command(), "Disarm");
    }

    #[test]
    fn test_empty_token_is_none() {
        let session = CloudSession::new("http://x/", "a", "b", "1", Some(String::new()));
        assert!(!session.has_token());
        assert_eq!(session.url("/api"), "http://x/api");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let session = CloudSession::new("http://x", "a@b.c", "pw-secret", "1", Some("tok-secret".into()));
        let text = format!("{session:?}");
        assert!(!text.contains("pw-secret"));
        assert!(!text.contains("tok-secret"));
    }
}
