//! Per-room bounded history (newest first) plus the relay-mode text side table.
//!
//! Appends to one room are serialized by that room's own lock; rooms never
//! contend with each other beyond a brief shared read of the room index.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use clipsync_shared::constants::{HISTORY_LIMIT_MAX, HISTORY_LIMIT_MIN};
use clipsync_shared::protocol::HistoryItem;
use clipsync_shared::RoomKey;

#[derive(Default)]
struct RoomHistory {
    /// Newest first.
    items: VecDeque<HistoryItem>,
    text_by_id: HashMap<String, String>,
}

impl RoomHistory {
    fn append(&mut self, item: HistoryItem, text: Option<String>, capacity: usize) {
        if let Some(text) = text {
            self.text_by_id.insert(item.id.clone(), text);
        }
        self.items.push_front(item);

        while self.items.len() > capacity {
            let Some(evicted) = self.items.pop_back() else {
                break;
            };
            // The same id can appear twice when identical content is re-published.
            if !self.items.iter().any(|i| i.id == evicted.id) {
                self.text_by_id.remove(&evicted.id);
            }
        }
    }
}

#[derive(Clone)]
pub struct HistoryState {
    capacity: usize,
    rooms: Arc<RwLock<HashMap<RoomKey, Arc<Mutex<RoomHistory>>>>>,
}

impl HistoryState {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn room(&self, room_key: &RoomKey) -> Arc<Mutex<RoomHistory>> {
        if let Some(room) = self.rooms.read().await.get(room_key) {
            return room.clone();
        }
        self.rooms
            .write()
            .await
            .entry(room_key.clone())
            .or_default()
            .clone()
    }

    /// Insert `item` at the front, evicting the oldest entries beyond capacity.
    ///
    /// `text` is stored in the side table for text items so it can be
    /// fetched later by id; append and eviction happen under one lock.
    pub async fn append(&self, room_key: &RoomKey, item: HistoryItem, text: Option<String>) {
        let room = self.room(room_key).await;
        let mut room = room.lock().await;
        room.append(item, text, self.capacity);
        debug!(room_key = %room_key, len = room.items.len(), "History appended");
    }

    /// Up to `clamp(limit, 1, 100)` most recent items, newest first.
    pub async fn get_history(&self, room_key: &RoomKey, limit: i32) -> Vec<HistoryItem> {
        let limit = clamp_limit(limit);
        let Some(room) = self.rooms.read().await.get(room_key).cloned() else {
            return Vec::new();
        };
        let room = room.lock().await;
        room.items.iter().take(limit).cloned().collect()
    }

    pub async fn get_text(&self, room_key: &RoomKey, item_id: &str) -> Option<String> {
        if item_id.trim().is_empty() {
            return None;
        }
        let room = self.rooms.read().await.get(room_key).cloned()?;
        let room = room.lock().await;
        room.text_by_id.get(item_id).cloned()
    }
}

fn clamp_limit(limit: i32) -> usize {
    (limit.max(0) as usize).clamp(HISTORY_LIMIT_MIN, HISTORY_LIMIT_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipsync_shared::HistoryKind;
    use uuid::Uuid;

    fn item(id: &str) -> HistoryItem {
        HistoryItem {
            id: id.into(),
            room_id: "room".into(),
            kind: HistoryKind::Text,
            origin_device_id: Uuid::new_v4(),
            ts_utc_ms: 1,
            title: id.into(),
            preview: Some(id.into()),
            size_bytes: id.len() as i64,
            content_hash: vec![0u8; 32],
            content_type: "text/plain".into(),
            provider_file_id: None,
            object_key: None,
        }
    }

    #[tokio::test]
    async fn test_newest_first_and_bounded() {
        let history = HistoryState::new(10);
        let key = RoomKey::shared("room");
        for i in 0..15 {
            history
                .append(&key, item(&format!("item-{i}")), Some(format!("text-{i}")))
                .await;
        }

        let items = history.get_history(&key, 100).await;
        assert_eq!(items.len(), 10);
        assert_eq!(items[0].id, "item-14");
        assert_eq!(items[9].id, "item-5");
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let history = HistoryState::new(10);
        let key = RoomKey::shared("room");
        for i in 0..3 {
            history.append(&key, item(&format!("item-{i}")), None).await;
        }

        assert_eq!(history.get_history(&key, 0).await.len(), 1);
        assert_eq!(history.get_history(&key, -5).await.len(), 1);
        assert_eq!(history.get_history(&key, 2).await.len(), 2);
        assert_eq!(history.get_history(&key, 1000).await.len(), 3);
    }

    #[tokio::test]
    async fn test_text_side_table_follows_eviction() {
        let history = HistoryState::new(2);
        let key = RoomKey::shared("room");
        history.append(&key, item("a"), Some("alpha".into())).await;
        history.append(&key, item("b"), Some("beta".into())).await;
        assert_eq!(history.get_text(&key, "a").await.as_deref(), Some("alpha"));

        history.append(&key, item("c"), Some("gamma".into())).await;
        assert!(history.get_text(&key, "a").await.is_none());
        assert_eq!(history.get_text(&key, "c").await.as_deref(), Some("gamma"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_text_until_last_copy_evicted() {
        let history = HistoryState::new(2);
        let key = RoomKey::shared("room");
        history.append(&key, item("same"), Some("x".into())).await;
        history.append(&key, item("same"), Some("x".into())).await;
        history.append(&key, item("other"), None).await;
        assert_eq!(history.get_text(&key, "same").await.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_unknown_room_is_empty() {
        let history = HistoryState::new(10);
        let key = RoomKey::shared("nobody");
        assert!(history.get_history(&key, 10).await.is_empty());
        assert!(history.get_text(&key, "x").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_appends_never_exceed_capacity() {
        let history = HistoryState::new(10);
        let key = RoomKey::shared("busy");
        let mut handles = Vec::new();
        for i in 0..64 {
            let history = history.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                history.append(&key, item(&format!("item-{i}")), None).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(history.get_history(&key, 100).await.len(), 10);
    }
}
