//! HTTP calls to the relay's account endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ClientError;

/// What the relay reports about its account mode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAuthStatus {
    pub enabled: bool,
    #[serde(default)]
    pub issuer_configured: bool,
    #[serde(default)]
    pub audience_configured: bool,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub identity_provider_ids_configured: bool,
}

/// A relay bearer token obtained by exchanging an identity-provider credential.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub subject: String,
    pub email: Option<String>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("subject", &self.subject)
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    id_token: Option<&'a str>,
    access_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    expires_utc_ms: i64,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

pub struct ServerAuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl ServerAuthClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::Config("server URL is required".into()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    /// `GET /auth/status`
    pub async fn status(&self) -> Result<ServerAuthStatus, ClientError> {
        let url = format!("{}/auth/status", self.base_url);
        let response = check(&url, self.http.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// `POST /auth/google`: trade a Google ID or access token for a relay token.
    pub async fn login_google(
        &self,
        id_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<AuthSession, ClientError> {
        let id_token = id_token.filter(|t| !t.trim().is_empty());
        let access_token = access_token.filter(|t| !t.trim().is_empty());
        if id_token.is_none() && access_token.is_none() {
            return Err(ClientError::Config(
                "either an ID token or an access token is required".into(),
            ));
        }

        let url = format!("{}/auth/google", self.base_url);
        let request = self.http.post(&url).json(&LoginRequest {
            id_token,
            access_token,
        });
        let response = check(&url, request.send().await?).await?;
        let payload: LoginResponse = response.json().await?;

        if payload.token.trim().is_empty() {
            return Err(ClientError::UnexpectedResponse("auth/google"));
        }
        let expires_at = DateTime::from_timestamp_millis(payload.expires_utc_ms)
            .ok_or(ClientError::UnexpectedResponse("auth/google"))?;

        let session = AuthSession {
            token: payload.token,
            expires_at,
            subject: payload.subject.unwrap_or_default(),
            email: payload.email,
        };
        info!(subject = %session.subject, expires = %session.expires_at, "Signed in to relay");
        Ok(session)
    }
}

async fn check(url: &str, response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Server {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}
