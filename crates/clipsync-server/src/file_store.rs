use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use clipsync_shared::RoomKey;

use crate::error::HubError;

/// Relay-mode file payloads, keyed by `(room key, item id)`.
///
/// Entries live until the process exits; each payload is capped at
/// `max_size` bytes.
#[derive(Debug, Clone)]
pub struct FilePayloadStore {
    files: Arc<RwLock<HashMap<(RoomKey, String), Bytes>>>,
    max_size: usize,
}

impl FilePayloadStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
            max_size,
        }
    }

    pub async fn put(&self, room_key: &RoomKey, item_id: &str, data: Bytes) -> Result<(), HubError> {
        if data.is_empty() {
            return Err(HubError::Validation("bytes are required".to_string()));
        }
        if data.len() > self.max_size {
            return Err(HubError::Validation(format!(
                "file exceeds max of {} bytes",
                self.max_size
            )));
        }

        let size = data.len();
        self.files
            .write()
            .await
            .insert((room_key.clone(), item_id.to_string()), data);

        debug!(room_key = %room_key, item = %item_id, size, "Stored file payload");
        Ok(())
    }

    pub async fn get(&self, room_key: &RoomKey, item_id: &str) -> Option<Bytes> {
        self.files
            .read()
            .await
            .get(&(room_key.clone(), item_id.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = FilePayloadStore::new(1024);
        let key = RoomKey::shared("room");
        store
            .put(&key, "item-1", Bytes::from_static(b"file-bytes"))
            .await
            .unwrap();
        assert_eq!(
            store.get(&key, "item-1").await.unwrap(),
            Bytes::from_static(b"file-bytes")
        );
    }

    #[tokio::test]
    async fn test_scoped_by_room_key() {
        let store = FilePayloadStore::new(1024);
        store
            .put(&RoomKey::for_subject("a", "default"), "item", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(store
            .get(&RoomKey::for_subject("b", "default"), "item")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_size_limits() {
        let store = FilePayloadStore::new(4);
        let key = RoomKey::shared("room");
        assert!(store.put(&key, "empty", Bytes::new()).await.is_err());
        assert!(store
            .put(&key, "big", Bytes::from_static(b"12345"))
            .await
            .is_err());
        assert!(store
            .put(&key, "fits", Bytes::from_static(b"1234"))
            .await
            .is_ok());
    }
}
