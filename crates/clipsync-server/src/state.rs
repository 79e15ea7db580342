//! Latest-value stores used for convergence pushes.
//!
//! Each room key holds exactly one latest value, overwritten on every
//! publish and pushed to sessions that join afterwards. State is ephemeral:
//! a restarted relay starts empty, which clients treat as a valid initial
//! state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use clipsync_shared::protocol::{ClipboardChanged, ClipboardItemPointer};
use clipsync_shared::RoomKey;

/// Room-key partitioned "latest wins" map.
pub struct LatestStore<T> {
    latest: Arc<RwLock<HashMap<RoomKey, T>>>,
}

impl<T: Clone> LatestStore<T> {
    pub fn new() -> Self {
        Self {
            latest: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get_latest(&self, room_key: &RoomKey) -> Option<T> {
        self.latest.read().await.get(room_key).cloned()
    }

    pub async fn set_latest(&self, room_key: &RoomKey, value: T) {
        self.latest.write().await.insert(room_key.clone(), value);
    }
}

impl<T: Clone> Default for LatestStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for LatestStore<T> {
    fn clone(&self) -> Self {
        Self {
            latest: self.latest.clone(),
        }
    }
}

/// Latest text clipboard per room key.
pub type ClipboardState = LatestStore<ClipboardChanged>;

/// Latest pointer per room key (pointer-only mode).
pub type PointerState = LatestStore<ClipboardItemPointer>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn changed(text: &str) -> ClipboardChanged {
        ClipboardChanged {
            origin_device_id: Uuid::new_v4(),
            server_ts_utc_ms: 1,
            text: text.into(),
            text_hash: vec![0u8; 32],
        }
    }

    #[tokio::test]
    async fn test_latest_wins() {
        let state = ClipboardState::new();
        let key = RoomKey::shared("room");
        assert!(state.get_latest(&key).await.is_none());

        state.set_latest(&key, changed("first")).await;
        state.set_latest(&key, changed("second")).await;
        assert_eq!(state.get_latest(&key).await.unwrap().text, "second");
    }

    #[tokio::test]
    async fn test_room_keys_do_not_leak() {
        let state = ClipboardState::new();
        state
            .set_latest(&RoomKey::for_subject("userA", "default"), changed("a"))
            .await;
        assert!(state
            .get_latest(&RoomKey::for_subject("userB", "default"))
            .await
            .is_none());
        assert!(state.get_latest(&RoomKey::shared("default")).await.is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let state = PointerState::new();
        let other = state.clone();
        let key = RoomKey::shared("room");
        other
            .set_latest(
                &key,
                ClipboardItemPointer {
                    room_id: "room".into(),
                    origin_device_id: Uuid::new_v4(),
                    ts_utc_ms: 1,
                    object_key: "k".into(),
                    provider_file_id: None,
                    content_hash: vec![1u8; 32],
                    size_bytes: 0,
                    content_type: "text".into(),
                },
            )
            .await;
        assert_eq!(state.get_latest(&key).await.unwrap().object_key, "k");
    }
}
