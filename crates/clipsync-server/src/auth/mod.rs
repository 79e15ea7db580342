//! Account mode: identity validation, relay token issuance and the
//! per-account room key.

pub mod identity;
pub mod token;

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::AuthError;

pub use identity::{GoogleIdentityValidator, IdentityValidator};
pub use token::{IssuedToken, TokenIssuer};

/// A verified account identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthStatus {
    pub enabled: bool,
    pub issuer_configured: bool,
    pub audience_configured: bool,
    pub identity_provider_configured: bool,
}

/// Combines the identity provider with the relay's own token issuer.
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    validator: Arc<dyn IdentityValidator>,
    issuer: TokenIssuer,
}

impl AuthService {
    pub fn new(config: AuthConfig, validator: Arc<dyn IdentityValidator>) -> Self {
        let issuer = TokenIssuer::new(&config);
        Self {
            config,
            validator,
            issuer,
        }
    }

    /// Production wiring: Google tokeninfo with the configured client ids.
    pub fn from_config(config: AuthConfig) -> Self {
        let validator = Arc::new(GoogleIdentityValidator::new(
            config.google_client_ids.clone(),
        ));
        Self::new(config, validator)
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub async fn validate_identity(
        &self,
        id_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<Principal, AuthError> {
        self.validator.validate(id_token, access_token).await
    }

    pub fn issue_token(&self, subject: &str, email: Option<&str>) -> Result<IssuedToken, AuthError> {
        self.issuer.issue(subject, email)
    }

    /// Validate a relay-issued bearer token.
    pub fn authenticate(&self, bearer: &str) -> Result<Principal, AuthError> {
        self.issuer.validate(bearer)
    }

    pub fn get_status(&self) -> AuthStatus {
        AuthStatus {
            enabled: self.config.enabled,
            issuer_configured: !self.config.jwt_issuer.trim().is_empty(),
            audience_configured: !self.config.jwt_audience.trim().is_empty(),
            identity_provider_configured: !self.config.google_client_ids.is_empty(),
        }
    }
}
