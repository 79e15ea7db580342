//! Shared-secret room registry (used when account auth is disabled).
//!
//! The first successful join defines a room's secret; later joins must
//! present a secret hashing to the same value. Rooms live for the lifetime
//! of the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use clipsync_shared::crypto::{hash_equals, room_secret_hash, ContentHash};

#[derive(Clone, Default)]
pub struct RoomRegistry {
    secret_hashes: Arc<RwLock<HashMap<String, ContentHash>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the room with `secret` if it does not exist, otherwise checks
    /// `secret` against the stored hash in constant time.
    ///
    /// Returns false for blank inputs or a mismatched secret.
    pub async fn ensure_room_and_validate_secret(&self, room_id: &str, secret: &str) -> bool {
        if room_id.trim().is_empty() || secret.trim().is_empty() {
            return false;
        }

        let hash = room_secret_hash(room_id, secret);

        // Fast path: existing rooms only need the shared lock.
        if let Some(existing) = self.secret_hashes.read().await.get(room_id) {
            return hash_equals(existing, &hash);
        }

        let mut rooms = self.secret_hashes.write().await;
        let mut created = false;
        let existing = rooms.entry(room_id.to_string()).or_insert_with(|| {
            created = true;
            hash
        });
        let ok = hash_equals(&existing[..], &hash);
        let room_count = rooms.len();
        drop(rooms);

        if created {
            info!(room = %room_id, rooms = room_count, "Created room");
        } else {
            debug!(room = %room_id, ok, "Room created concurrently; validated against winner");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_join_defines_secret() {
        let registry = RoomRegistry::new();
        assert!(registry.ensure_room_and_validate_secret("room", "secretA").await);
        assert!(registry.ensure_room_and_validate_secret("room", "secretA").await);
        assert!(!registry.ensure_room_and_validate_secret("room", "secretB").await);
    }

    #[tokio::test]
    async fn test_blank_inputs_rejected() {
        let registry = RoomRegistry::new();
        assert!(!registry.ensure_room_and_validate_secret("", "secret").await);
        assert!(!registry.ensure_room_and_validate_secret("room", "   ").await);
        // The rejected attempts did not create anything.
        assert!(registry.ensure_room_and_validate_secret("room", "real").await);
        assert!(!registry.ensure_room_and_validate_secret("room", "secret").await);
    }

    #[tokio::test]
    async fn test_rooms_are_independent() {
        let registry = RoomRegistry::new();
        assert!(registry.ensure_room_and_validate_secret("a", "one").await);
        assert!(registry.ensure_room_and_validate_secret("b", "two").await);
        assert!(!registry.ensure_room_and_validate_secret("a", "two").await);
    }

    #[tokio::test]
    async fn test_concurrent_first_joins_agree_on_one_secret() {
        let registry = RoomRegistry::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .ensure_room_and_validate_secret("race", &format!("secret-{}", i % 2))
                    .await
            }));
        }

        let mut accepted = Vec::new();
        for (i, handle) in handles.into_iter().enumerate() {
            if handle.await.unwrap() {
                accepted.push(i % 2);
            }
        }

        // Only one secret can have won.
        assert!(!accepted.is_empty());
        assert!(accepted.iter().all(|s| *s == accepted[0]));
    }
}
