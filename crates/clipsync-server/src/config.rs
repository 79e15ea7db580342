//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the relay can start with zero
//! configuration for local development (shared-secret rooms, no auth).

use std::net::SocketAddr;

use clipsync_shared::constants::{DEFAULT_MAX_MESSAGE_BYTES, HISTORY_CAPACITY};

/// Account-mode settings.
#[derive(Clone)]
pub struct AuthConfig {
    /// When true, sessions must present a relay-issued bearer token and
    /// rooms are scoped per account. When false, rooms use shared secrets.
    /// Env: `AUTH_ENABLED` (true/false)
    /// Default: `false`
    pub enabled: bool,

    /// Issuer for relay-issued tokens.
    /// Env: `AUTH_JWT_ISSUER`
    /// Default: `"ClipboardSync"`
    pub jwt_issuer: String,

    /// Audience for relay-issued tokens.
    /// Env: `AUTH_JWT_AUDIENCE`
    /// Default: `"ClipboardSync"`
    pub jwt_audience: String,

    /// HMAC-SHA256 key for relay-issued tokens.
    /// Env: `AUTH_JWT_SIGNING_KEY`
    /// Default: empty (token issuance fails with a configuration error).
    pub jwt_signing_key: String,

    /// Allowed Google OAuth client ids (token audiences).
    /// Env: `AUTH_GOOGLE_CLIENT_IDS` (comma separated)
    pub google_client_ids: Vec<String>,

    /// Lifetime of relay-issued tokens, clamped to 5 minutes..7 days.
    /// Env: `AUTH_ACCESS_TOKEN_MINUTES`
    /// Default: `720` (12h)
    pub access_token_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jwt_issuer: "ClipboardSync".to_string(),
            jwt_audience: "ClipboardSync".to_string(),
            jwt_signing_key: String::new(),
            google_client_ids: Vec::new(),
            access_token_minutes: 12 * 60,
        }
    }
}

// Hand-written so the signing key never reaches the logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.enabled)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_signing_key_set", &!self.jwt_signing_key.is_empty())
            .field("google_client_ids", &self.google_client_ids)
            .field("access_token_minutes", &self.access_token_minutes)
            .finish()
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Maximum size of a single session frame.
    /// Env: `MAX_MESSAGE_BYTES`
    /// Default: 12 MiB
    pub max_message_bytes: usize,

    /// Number of history items kept per room.
    /// Env: `HISTORY_CAPACITY`
    /// Default: `10`
    pub history_capacity: usize,

    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            history_capacity: HISTORY_CAPACITY,
            auth: AuthConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(val) = lookup("MAX_MESSAGE_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_message_bytes = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_MESSAGE_BYTES, using default"),
            }
        }

        if let Some(val) = lookup("HISTORY_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.history_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid HISTORY_CAPACITY, using default"),
            }
        }

        // -- Auth --

        if let Some(val) = lookup("AUTH_ENABLED") {
            config.auth.enabled = parse_bool(&val);
        }

        if let Some(issuer) = lookup("AUTH_JWT_ISSUER") {
            if !issuer.trim().is_empty() {
                config.auth.jwt_issuer = issuer;
            }
        }

        if let Some(audience) = lookup("AUTH_JWT_AUDIENCE") {
            if !audience.trim().is_empty() {
                config.auth.jwt_audience = audience;
            }
        }

        if let Some(key) = lookup("AUTH_JWT_SIGNING_KEY") {
            config.auth.jwt_signing_key = key;
        }

        if let Some(ids) = lookup("AUTH_GOOGLE_CLIENT_IDS") {
            config.auth.google_client_ids = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(val) = lookup("AUTH_ACCESS_TOKEN_MINUTES") {
            if let Ok(n) = val.parse::<i64>() {
                config.auth.access_token_minutes = n;
            } else {
                tracing::warn!(value = %val, "Invalid AUTH_ACCESS_TOKEN_MINUTES, using default");
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_bool(val: &str) -> bool {
    matches!(val.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
