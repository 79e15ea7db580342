//! Relay-issued bearer tokens (compact JWS, HS256).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::AuthConfig;
use crate::error::AuthError;

use super::Principal;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_TOKEN_MINUTES: i64 = 5;
pub const MAX_TOKEN_MINUTES: i64 = 7 * 24 * 60;

/// Allowed clock drift when checking `exp` / `nbf`.
const CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    iss: String,
    aud: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

/// A freshly issued token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    audience: String,
    signing_key: Vec<u8>,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let minutes = config
            .access_token_minutes
            .clamp(MIN_TOKEN_MINUTES, MAX_TOKEN_MINUTES);
        Self {
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            signing_key: config.jwt_signing_key.as_bytes().to_vec(),
            lifetime: Duration::minutes(minutes),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, subject: &str, email: Option<&str>) -> Result<IssuedToken, AuthError> {
        self.issue_at(subject, email, Utc::now())
    }

    fn issue_at(
        &self,
        subject: &str,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        if subject.trim().is_empty() {
            return Err(AuthError::InvalidCredential("subject is required".into()));
        }
        let mac = self.mac()?;

        let expires_at = now + self.lifetime;
        let claims = Claims {
            sub: subject.to_string(),
            email: email.filter(|e| !e.trim().is_empty()).map(String::from),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let header = Header {
            alg: "HS256".into(),
            typ: "JWT".into(),
        };

        let signing_input = format!("{}.{}", encode_part(&header)?, encode_part(&claims)?);
        let signature = sign(mac, signing_input.as_bytes());

        Ok(IssuedToken {
            token: format!("{signing_input}.{signature}"),
            expires_at,
        })
    }

    /// Check signature, issuer, audience and lifetime, returning the principal.
    pub fn validate(&self, token: &str) -> Result<Principal, AuthError> {
        self.validate_at(token, Utc::now())
    }

    fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, AuthError> {
        let mut mac = self.mac()?;

        let mut parts = token.trim().split('.');
        let (header_b64, claims_b64, sig_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(c), Some(s)) if parts.next().is_none() => (h, c, s),
            _ => return Err(invalid("malformed token")),
        };

        let header: Header = decode_part(header_b64)?;
        if header.alg != "HS256" {
            return Err(invalid("unsupported token algorithm"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| invalid("malformed token signature"))?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        // constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| invalid("token signature mismatch"))?;

        let claims: Claims = decode_part(claims_b64)?;
        if claims.iss != self.issuer {
            return Err(invalid("token issuer mismatch"));
        }
        if claims.aud != self.audience {
            return Err(invalid("token audience mismatch"));
        }

        let now_secs = now.timestamp();
        if now_secs > claims.exp + CLOCK_SKEW_SECS {
            return Err(invalid("token expired"));
        }
        if now_secs + CLOCK_SKEW_SECS < claims.nbf {
            return Err(invalid("token not yet valid"));
        }
        if claims.sub.trim().is_empty() {
            return Err(invalid("token has no subject"));
        }

        Ok(Principal {
            subject: claims.sub,
            email: claims.email,
        })
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        if self.signing_key.is_empty() {
            return Err(AuthError::Configuration(
                "AUTH_JWT_SIGNING_KEY must be set when auth is enabled".into(),
            ));
        }
        HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| AuthError::Configuration(format!("invalid signing key: {e}")))
    }
}

fn invalid(msg: &str) -> AuthError {
    AuthError::InvalidCredential(msg.to_string())
}

fn encode_part<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| AuthError::Configuration(format!("token encoding failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, AuthError> {
    let json = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| invalid("malformed token segment"))?;
    serde_json::from_slice(&json).map_err(|_| invalid("malformed token claims"))
}

fn sign(mut mac: HmacSha256, input: &[u8]) -> String {
    mac.update(input);
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}
