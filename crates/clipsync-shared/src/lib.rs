//! # clipsync-shared
//!
//! Types shared by the clipboard relay and its clients:
//! - **protocol**: clipboard, pointer, history and file DTOs (bincode)
//! - **wire**: the session envelope (invocations, completions, events)
//! - **loop_guard**: client-side echo and feedback-loop suppression
//! - **crypto**: SHA-256 content hashing and constant-time comparison

pub mod constants;
pub mod crypto;
pub mod error;
pub mod loop_guard;
pub mod protocol;
pub mod types;
pub mod wire;

pub use error::ProtocolError;
pub use loop_guard::LoopGuard;
pub use types::{HistoryKind, RoomKey};
