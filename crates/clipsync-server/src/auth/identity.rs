//! Third-party identity validation.
//!
//! The relay never trusts a Google credential directly: it asks Google's
//! tokeninfo endpoint to describe the token and then checks the audience
//! against the configured client ids.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AuthError;

use super::Principal;

pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam for identity providers. Production uses Google; tests use a fake.
#[async_trait]
pub trait IdentityValidator: Send + Sync {
    /// Validate an ID token (preferred) or an opaque access token.
    async fn validate(
        &self,
        id_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<Principal, AuthError>;
}

/// Subset of the tokeninfo response we care about. Field availability differs
/// between ID-token and access-token lookups.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    azp: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

enum TokenKind {
    Id,
    Access,
}

pub struct GoogleIdentityValidator {
    http: reqwest::Client,
    tokeninfo_url: String,
    client_ids: Vec<String>,
}

impl GoogleIdentityValidator {
    pub fn new(client_ids: Vec<String>) -> Self {
        Self::with_endpoint(client_ids, GOOGLE_TOKENINFO_URL)
    }

    /// Point the validator at a different tokeninfo endpoint.
    pub fn with_endpoint(client_ids: Vec<String>, tokeninfo_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            tokeninfo_url: tokeninfo_url.into(),
            client_ids,
        }
    }

    async fn lookup(&self, kind: TokenKind, token: &str) -> Result<Principal, AuthError> {
        let param = match kind {
            TokenKind::Id => "id_token",
            TokenKind::Access => "access_token",
        };

        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[(param, token)])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Identity provider unreachable");
                AuthError::InvalidCredential("identity provider unreachable".into())
            })?;

        if !response.status().is_success() {
            debug!(status = %response.status(), kind = param, "Identity provider rejected token");
            return Err(AuthError::InvalidCredential(format!(
                "identity provider rejected the {param}"
            )));
        }

        let info: TokenInfo = response.json().await.map_err(|e| {
            AuthError::InvalidCredential(format!("unreadable tokeninfo response: {e}"))
        })?;

        self.check(kind, info)
    }

    fn check(&self, kind: TokenKind, info: TokenInfo) -> Result<Principal, AuthError> {
        // Access tokens may report the client id as `azp` only.
        let audience = info.aud.as_deref().or(info.azp.as_deref()).unwrap_or("");
        if audience.is_empty() || !self.client_ids.iter().any(|id| id == audience) {
            return Err(AuthError::InvalidCredential(
                "token audience is not allowed".into(),
            ));
        }

        if let TokenKind::Id = kind {
            let issuer = info.iss.as_deref().unwrap_or("");
            if !GOOGLE_ISSUERS.contains(&issuer) {
                return Err(AuthError::InvalidCredential(
                    "token issuer is not Google".into(),
                ));
            }
        }

        let subject = info
            .sub
            .or(info.user_id)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if subject.is_empty() {
            return Err(AuthError::InvalidCredential(
                "token did not include a subject".into(),
            ));
        }

        Ok(Principal {
            subject,
            email: info.email.filter(|e| !e.trim().is_empty()),
        })
    }
}

#[async_trait]
impl IdentityValidator for GoogleIdentityValidator {
    async fn validate(
        &self,
        id_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<Principal, AuthError> {
        if self.client_ids.is_empty() {
            return Err(AuthError::Configuration(
                "AUTH_GOOGLE_CLIENT_IDS must be configured when auth is enabled".into(),
            ));
        }

        let id_token = id_token.map(str::trim).filter(|t| !t.is_empty());
        let access_token = access_token.map(str::trim).filter(|t| !t.is_empty());

        match (id_token, access_token) {
            (Some(token), _) => self.lookup(TokenKind::Id, token).await,
            (None, Some(token)) => self.lookup(TokenKind::Access, token).await,
            (None, None) => Err(AuthError::InvalidCredential(
                "either idToken or accessToken must be provided".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    /// Minimal tokeninfo stand-in: the token text picks the response.
    async fn tokeninfo(
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if let Some(id_token) = params.get("id_token") {
            return match id_token.as_str() {
                "good-id" => Ok(Json(serde_json::json!({
                    "aud": "client-1",
                    "iss": "https://accounts.google.com",
                    "sub": "google-sub-1",
                    "email": "a@example.com",
                }))),
                "wrong-issuer" => Ok(Json(serde_json::json!({
                    "aud": "client-1",
                    "iss": "https://evil.example.com",
                    "sub": "google-sub-1",
                }))),
                _ => Err(StatusCode::BAD_REQUEST),
            };
        }
        match params.get("access_token").map(String::as_str) {
            Some("good-access") => Ok(Json(serde_json::json!({
                "azp": "client-1",
                "user_id": "google-sub-2",
            }))),
            Some("other-app") => Ok(Json(serde_json::json!({
                "aud": "someone-elses-client",
                "sub": "google-sub-3",
            }))),
            _ => Err(StatusCode::BAD_REQUEST),
        }
    }

    async fn spawn_tokeninfo() -> String {
        let app = Router::new().route("/tokeninfo", get(tokeninfo));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/tokeninfo")
    }

    fn validator(url: &str) -> GoogleIdentityValidator {
        GoogleIdentityValidator::with_endpoint(vec!["client-1".into()], url)
    }

    #[tokio::test]
    async fn test_id_token_accepted() {
        let url = spawn_tokeninfo().await;
        let principal = validator(&url).validate(Some("good-id"), None).await.unwrap();
        assert_eq!(principal.subject, "google-sub-1");
        assert_eq!(principal.email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn test_access_token_falls_back_to_user_id() {
        let url = spawn_tokeninfo().await;
        let principal = validator(&url)
            .validate(None, Some("good-access"))
            .await
            .unwrap();
        assert_eq!(principal.subject, "google-sub-2");
        assert_eq!(principal.email, None);
    }

    #[tokio::test]
    async fn test_foreign_audience_rejected() {
        let url = spawn_tokeninfo().await;
        let err = validator(&url)
            .validate(None, Some("other-app"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_wrong_issuer_rejected() {
        let url = spawn_tokeninfo().await;
        assert!(validator(&url)
            .validate(Some("wrong-issuer"), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_provider_rejection_is_invalid_credential() {
        let url = spawn_tokeninfo().await;
        let err = validator(&url).validate(Some("bogus"), None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_invalid_credential() {
        // Nothing listens on port 9 locally.
        let err = validator("http://127.0.0.1:9/tokeninfo")
            .validate(Some("good-id"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_requires_some_token() {
        let err = validator("http://127.0.0.1:9/tokeninfo")
            .validate(Some("  "), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_empty_allow_list_is_configuration_error() {
        let v = GoogleIdentityValidator::with_endpoint(Vec::new(), "http://127.0.0.1:9/");
        assert!(matches!(
            v.validate(Some("good-id"), None).await,
            Err(AuthError::Configuration(_))
        ));
    }
}
