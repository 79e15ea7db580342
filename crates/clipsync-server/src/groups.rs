//! Broadcast groups: room key → member sessions.
//!
//! Fan-out is fire and forget. A member whose outbound queue is full or
//! closed misses the event instead of stalling the publisher.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use clipsync_shared::wire::{HubEvent, ServerFrame};
use clipsync_shared::RoomKey;

pub type SessionId = Uuid;

/// Queue of frames waiting to be written to one session's socket.
pub type Outbound = mpsc::Sender<ServerFrame>;

struct Group {
    room_key: RoomKey,
    members: HashMap<SessionId, Outbound>,
}

impl Group {
    fn new(room_key: RoomKey) -> Self {
        Self {
            room_key,
            members: HashMap::new(),
        }
    }

    fn broadcast(&self, event: &HubEvent) -> usize {
        let mut delivered = 0;
        for (session_id, tx) in &self.members {
            if tx.try_send(ServerFrame::Event(event.clone())).is_ok() {
                delivered += 1;
            } else {
                debug!(
                    room_key = %self.room_key,
                    session = %session_id,
                    "Dropping event for slow or closed session"
                );
            }
        }
        delivered
    }
}

#[derive(Clone, Default)]
pub struct BroadcastGroups {
    groups: Arc<RwLock<HashMap<RoomKey, Group>>>,
}

impl BroadcastGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a room's group (creates the group if missing).
    pub async fn join(&self, room_key: &RoomKey, session_id: SessionId, tx: Outbound) {
        let mut groups = self.groups.write().await;
        let group = groups
            .entry(room_key.clone())
            .or_insert_with(|| Group::new(room_key.clone()));
        group.members.insert(session_id, tx);

        info!(
            room_key = %room_key,
            session = %session_id,
            members = group.members.len(),
            "Session joined group"
        );
    }

    /// Remove a session. Empty groups are dropped.
    pub async fn leave(&self, room_key: &RoomKey, session_id: &SessionId) {
        let mut groups = self.groups.write().await;
        let should_remove = if let Some(group) = groups.get_mut(room_key) {
            group.members.remove(session_id);
            debug!(
                room_key = %room_key,
                session = %session_id,
                members = group.members.len(),
                "Session left group"
            );
            group.members.is_empty()
        } else {
            false
        };

        if should_remove {
            groups.remove(room_key);
            debug!(room_key = %room_key, "Removed empty group");
        }
    }

    /// Send `event` to every member of the room's group, including the
    /// publisher. Returns how many members accepted it.
    pub async fn broadcast(&self, room_key: &RoomKey, event: HubEvent) -> usize {
        let groups = self.groups.read().await;
        match groups.get(room_key) {
            Some(group) => group.broadcast(&event),
            None => 0,
        }
    }

    pub async fn member_count(&self, room_key: &RoomKey) -> usize {
        self.groups
            .read()
            .await
            .get(room_key)
            .map(|g| g.members.len())
            .unwrap_or(0)
    }

    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipsync_shared::protocol::ClipboardChanged;

    fn event(text: &str) -> HubEvent {
        HubEvent::ClipboardChanged(ClipboardChanged {
            origin_device_id: Uuid::new_v4(),
            server_ts_utc_ms: 1,
            text: text.into(),
            text_hash: vec![0u8; 32],
        })
    }

    #[tokio::test]
    async fn test_join_leave() {
        let groups = BroadcastGroups::new();
        let key = RoomKey::shared("room");
        let session = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(8);

        groups.join(&key, session, tx).await;
        assert_eq!(groups.member_count(&key).await, 1);

        groups.leave(&key, &session).await;
        assert_eq!(groups.group_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_same_room() {
        let groups = BroadcastGroups::new();
        let room_a = RoomKey::for_subject("userA", "default");
        let room_b = RoomKey::for_subject("userB", "default");

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        groups.join(&room_a, Uuid::new_v4(), tx_a).await;
        groups.join(&room_b, Uuid::new_v4(), tx_b).await;

        assert_eq!(groups.broadcast(&room_a, event("hello")).await, 1);

        assert!(matches!(rx_a.try_recv(), Ok(ServerFrame::Event(_))));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_member_does_not_block() {
        let groups = BroadcastGroups::new();
        let key = RoomKey::shared("room");

        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        groups.join(&key, Uuid::new_v4(), slow_tx).await;
        groups.join(&key, Uuid::new_v4(), fast_tx).await;

        groups.broadcast(&key, event("one")).await;
        // slow queue is now full; the second event is dropped for it only
        assert_eq!(groups.broadcast(&key, event("two")).await, 1);

        assert!(fast_rx.try_recv().is_ok());
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_to_unknown_room() {
        let groups = BroadcastGroups::new();
        assert_eq!(
            groups.broadcast(&RoomKey::shared("ghost"), event("x")).await,
            0
        );
    }
}
