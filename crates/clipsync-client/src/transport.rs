//! The seams between the sync engines and the outside world.

use async_trait::async_trait;

use clipsync_shared::protocol::{
    ClipboardFilePublish, ClipboardItemPointer, ClipboardPublish, HistoryList,
};

use crate::error::ClientError;

/// Session RPCs the sync engines need from the relay.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn join_room(&self, room_id: &str, room_secret: &str) -> Result<(), ClientError>;

    async fn publish_text(&self, publish: ClipboardPublish) -> Result<(), ClientError>;

    async fn publish_pointer(&self, pointer: ClipboardItemPointer) -> Result<(), ClientError>;

    async fn publish_file(&self, publish: ClipboardFilePublish) -> Result<(), ClientError>;

    async fn get_history(&self, limit: i32) -> Result<HistoryList, ClientError>;

    async fn get_history_text(&self, item_id: &str) -> Result<String, ClientError>;
}

/// The local OS clipboard. Polling and change detection live elsewhere;
/// the engines only need to write remote text.
#[async_trait]
pub trait ClipboardAccess: Send + Sync {
    async fn apply_remote_text(&self, text: &str) -> Result<(), ClientError>;
}
