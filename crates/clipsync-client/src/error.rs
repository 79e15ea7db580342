use thiserror::Error;

use clipsync_shared::wire::{RpcError, RpcErrorKind};
use clipsync_shared::ProtocolError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No live session; the connection is (re)connecting or was closed.
    #[error("Not connected to the relay")]
    NotConnected,

    #[error("Connection closed before the call completed")]
    ConnectionClosed,

    #[error("Call timed out")]
    Timeout,

    /// The relay rejected the call.
    #[error("Relay error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from one of the relay's HTTP endpoints.
    #[error("Server returned {status} at {url}: {body}")]
    Server {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Payload store error: {0}")]
    Store(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// The relay's error kind, when the relay rejected the call.
    pub fn rpc_kind(&self) -> Option<RpcErrorKind> {
        match self {
            ClientError::Rpc(err) => Some(err.kind),
            _ => None,
        }
    }
}
