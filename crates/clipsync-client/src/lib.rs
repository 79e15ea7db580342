//! # clipsync-client
//!
//! Reference client for the clipboard relay:
//! - **connection**: reconnecting WebSocket session with call correlation
//! - **sync**: relay mode, where the relay carries clipboard text
//! - **pointer_sync**: pointer mode, where text lives in a shared payload store
//! - **manifest**: shared per-room history for pointer mode
//! - **server_auth**: account sign-in against the relay's HTTP endpoints

pub mod config;
pub mod connection;
pub mod error;
pub mod manifest;
pub mod pointer_sync;
pub mod server_auth;
pub mod sync;
pub mod transport;

pub use config::ClientConfig;
pub use connection::{ConnectionState, RelayConnection};
pub use error::ClientError;
pub use manifest::{FsManifestStore, HistoryManifest, ManifestItem, ManifestStore};
pub use pointer_sync::{PayloadStore, PointerSync, UploadedPayload};
pub use server_auth::{AuthSession, ServerAuthClient, ServerAuthStatus};
pub use sync::{LocalOutcome, TextSync};
pub use transport::{ClipboardAccess, RelayTransport};
