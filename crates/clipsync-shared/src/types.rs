use serde::{Deserialize, Serialize};

/// Partition key for all per-room relay state and broadcast scoping.
///
/// Shared-secret rooms use the room id verbatim. Account rooms are prefixed
/// with the verified subject, so two accounts picking the same room id never
/// share state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn shared(room_id: &str) -> Self {
        Self(room_id.to_string())
    }

    pub fn for_subject(subject: &str, room_id: &str) -> Self {
        Self(format!("{subject}|{room_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum HistoryKind {
    Text = 0,
    File = 1,
}

impl HistoryKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Text),
            1 => Some(Self::File),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_keys_are_scoped_by_subject() {
        let a = RoomKey::for_subject("userA", "default");
        let b = RoomKey::for_subject("userB", "default");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "userA|default");
        assert_eq!(RoomKey::shared("default").as_str(), "default");
    }

    #[test]
    fn test_history_kind_from_byte() {
        assert_eq!(HistoryKind::from_byte(0), Some(HistoryKind::Text));
        assert_eq!(HistoryKind::from_byte(1), Some(HistoryKind::File));
        assert_eq!(HistoryKind::from_byte(7), None);
    }
}
