//! # clipsync-server
//!
//! Clipboard relay hub. Devices open a WebSocket session, join a room
//! (shared secret, or per-account when auth is enabled) and exchange
//! clipboard text, pointers to externally stored payloads, and small files.
//! All state is in memory and lives for the process lifetime.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod file_store;
pub mod groups;
pub mod history;
pub mod hub;
pub mod rooms;
pub mod session;
pub mod state;

use crate::api::AppState;
use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::hub::Hub;

/// Wire the hub and HTTP state from configuration.
pub fn build_state(config: ServerConfig) -> AppState {
    let auth = AuthService::from_config(config.auth.clone());
    let hub = Hub::new(&config, auth);
    AppState::new(hub, config)
}
