//! Client configuration loaded from environment variables.

use uuid::Uuid;

use clipsync_shared::constants::{DEFAULT_CLIENT_TEXT_BYTES, DEFAULT_ROOM_ID, HUB_PATH, MAX_TEXT_BYTES};

use crate::error::ClientError;

#[derive(Clone)]
pub struct ClientConfig {
    /// Relay base URL (`http(s)://` or `ws(s)://`).
    /// Env: `CLIPSYNC_SERVER_URL`
    /// Default: `http://localhost:8080`
    pub server_url: String,

    /// Env: `CLIPSYNC_ROOM_ID`
    /// Default: `"default"`
    pub room_id: String,

    /// Shared room secret (ignored when a bearer token is set).
    /// Env: `CLIPSYNC_ROOM_SECRET`
    pub room_secret: String,

    /// Stable id of this device. A random id is generated when unset.
    /// Env: `CLIPSYNC_DEVICE_ID`
    pub device_id: Uuid,

    /// Relay-issued token for account mode.
    /// Env: `CLIPSYNC_BEARER_TOKEN`
    pub bearer_token: Option<String>,

    /// Soft cap on published text, never above the protocol cap.
    /// Env: `CLIPSYNC_MAX_TEXT_BYTES`
    /// Default: 64 KiB
    pub max_text_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            room_id: DEFAULT_ROOM_ID.to_string(),
            room_secret: String::new(),
            device_id: Uuid::new_v4(),
            bearer_token: None,
            max_text_bytes: DEFAULT_CLIENT_TEXT_BYTES,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("room_id", &self.room_id)
            .field("room_secret_set", &!self.room_secret.is_empty())
            .field("device_id", &self.device_id)
            .field("bearer_token_set", &self.bearer_token.is_some())
            .field("max_text_bytes", &self.max_text_bytes)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("CLIPSYNC_SERVER_URL") {
            if !url.trim().is_empty() {
                config.server_url = url.trim().to_string();
            }
        }

        if let Some(room) = lookup("CLIPSYNC_ROOM_ID") {
            if !room.trim().is_empty() {
                config.room_id = room;
            }
        }

        if let Some(secret) = lookup("CLIPSYNC_ROOM_SECRET") {
            config.room_secret = secret;
        }

        if let Some(val) = lookup("CLIPSYNC_DEVICE_ID") {
            match Uuid::parse_str(val.trim()) {
                Ok(id) if !id.is_nil() => config.device_id = id,
                _ => tracing::warn!(value = %val, "Invalid CLIPSYNC_DEVICE_ID, using a random id"),
            }
        }

        if let Some(token) = lookup("CLIPSYNC_BEARER_TOKEN") {
            if !token.trim().is_empty() {
                config.bearer_token = Some(token.trim().to_string());
            }
        }

        if let Some(val) = lookup("CLIPSYNC_MAX_TEXT_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_text_bytes = n.min(MAX_TEXT_BYTES),
                _ => tracing::warn!(value = %val, "Invalid CLIPSYNC_MAX_TEXT_BYTES, using default"),
            }
        }

        config
    }

    /// WebSocket URL of the hub, carrying the bearer token when set.
    pub fn hub_url(&self) -> Result<String, ClientError> {
        let base = self.server_url.trim().trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(ClientError::Config(format!(
                "server url must be http(s) or ws(s): {base}"
            )));
        };

        Ok(match &self.bearer_token {
            Some(token) => format!("{ws_base}{HUB_PATH}?access_token={token}"),
            None => format!("{ws_base}{HUB_PATH}"),
        })
    }

    /// HTTP base URL, for the auth and download endpoints.
    pub fn http_base(&self) -> String {
        let base = self.server_url.trim().trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = base.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            base.to_string()
        }
    }

    /// Credentials sent with every `JoinRoom`. Account mode always joins
    /// the default room with no secret.
    pub fn join_credentials(&self) -> (String, String) {
        if self.bearer_token.is_some() {
            (DEFAULT_ROOM_ID.to_string(), String::new())
        } else {
            (self.room_id.clone(), self.room_secret.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.room_id, "default");
        assert_eq!(config.max_text_bytes, 64 * 1024);
        assert!(!config.device_id.is_nil());
        assert_eq!(config.hub_url().unwrap(), "ws://localhost:8080/hub/clipboard");
    }

    #[test]
    fn test_env_overrides() {
        let device = Uuid::new_v4();
        let config = config_from(&[
            ("CLIPSYNC_SERVER_URL", "https://relay.example.com/"),
            ("CLIPSYNC_ROOM_ID", "team"),
            ("CLIPSYNC_ROOM_SECRET", "hunter2"),
            ("CLIPSYNC_DEVICE_ID", &device.to_string()),
            ("CLIPSYNC_MAX_TEXT_BYTES", "999999999"),
        ]);
        assert_eq!(config.device_id, device);
        assert_eq!(config.max_text_bytes, MAX_TEXT_BYTES);
        assert_eq!(
            config.hub_url().unwrap(),
            "wss://relay.example.com/hub/clipboard"
        );
        assert_eq!(config.http_base(), "https://relay.example.com");
        assert_eq!(
            config.join_credentials(),
            ("team".to_string(), "hunter2".to_string())
        );
    }

    #[test]
    fn test_bearer_mode_joins_default_room() {
        let config = config_from(&[
            ("CLIPSYNC_ROOM_ID", "team"),
            ("CLIPSYNC_BEARER_TOKEN", "tok"),
        ]);
        assert_eq!(
            config.hub_url().unwrap(),
            "ws://localhost:8080/hub/clipboard?access_token=tok"
        );
        assert_eq!(config.join_credentials(), ("default".to_string(), String::new()));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[
            ("CLIPSYNC_DEVICE_ID", "not-a-uuid"),
            ("CLIPSYNC_MAX_TEXT_BYTES", "zero"),
        ]);
        assert!(!config.device_id.is_nil());
        assert_eq!(config.max_text_bytes, 64 * 1024);
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        let config = ClientConfig {
            server_url: "ftp://nope".into(),
            ..ClientConfig::default()
        };
        assert!(config.hub_url().is_err());
    }
}
