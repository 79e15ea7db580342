//! Session envelope carried in binary WebSocket frames.
//!
//! A client sends [`ClientFrame::Invoke`] with a caller-chosen `call_id`; the
//! relay answers with exactly one [`ServerFrame::Completion`] for that id.
//! Broadcasts and convergence pushes arrive as [`ServerFrame::Event`].

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::protocol::{
    ClipboardChanged, ClipboardFilePublish, ClipboardPointerChanged, ClipboardPointerPublish,
    ClipboardPublish, GetHistoryRequest, GetHistoryResponse, GetHistoryTextRequest,
    GetHistoryTextResponse, HistoryItemAdded,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubRequest {
    JoinRoom { room_id: String, room_secret: String },
    ClipboardPublish(ClipboardPublish),
    ClipboardPointerPublish(ClipboardPointerPublish),
    FilePublish(ClipboardFilePublish),
    GetHistory(GetHistoryRequest),
    GetHistoryText(GetHistoryTextRequest),
}

impl HubRequest {
    /// RPC method name, used for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "JoinRoom",
            Self::ClipboardPublish(_) => "ClipboardPublish",
            Self::ClipboardPointerPublish(_) => "ClipboardPointerPublish",
            Self::FilePublish(_) => "FilePublish",
            Self::GetHistory(_) => "GetHistory",
            Self::GetHistoryText(_) => "GetHistoryText",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubResponse {
    Joined,
    Published,
    History(GetHistoryResponse),
    HistoryText(GetHistoryTextResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubEvent {
    ClipboardChanged(ClipboardChanged),
    ClipboardPointerChanged(ClipboardPointerChanged),
    HistoryItemAdded(HistoryItemAdded),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcErrorKind {
    /// Malformed, oversized or missing fields.
    Validation,
    /// Room secret mismatch or missing/invalid identity.
    InvalidCredential,
    /// Called before a successful `JoinRoom`.
    NotJoined,
    /// Server-side misconfiguration.
    Configuration,
    NotFound,
}

/// Error returned to the single invoking session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct RpcError {
    pub kind: RpcErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    Invoke { call_id: u64, request: HubRequest },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    Completion {
        call_id: u64,
        outcome: Result<HubResponse, RpcError>,
    },
    Event(HubEvent),
}

impl ClientFrame {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }
}

impl ServerFrame {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }
}
