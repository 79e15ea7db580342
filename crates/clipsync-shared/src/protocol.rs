//! Message and DTO definitions shared by the relay and its clients.
//!
//! Every struct is encoded positionally with bincode, so field declaration
//! order is part of the wire contract. Do not reorder fields.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::types::HistoryKind;

/// Client → relay: publish local clipboard text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPublish {
    pub device_id: Uuid,
    pub client_item_id: Uuid,
    pub ts_client_utc_ms: i64,
    pub text: String,
    /// SHA-256 over the UTF-8 text. The relay recomputes it when missing or wrong.
    pub text_hash: Vec<u8>,
}

/// Relay → room: latest clipboard text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardChanged {
    pub origin_device_id: Uuid,
    pub server_ts_utc_ms: i64,
    pub text: String,
    pub text_hash: Vec<u8>,
}

/// Metadata-only reference to clipboard content stored outside the relay.
///
/// There is deliberately no free-text field: a pointer can never carry the
/// clipboard plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardItemPointer {
    /// Logical room id as the client knows it (never the internal room key).
    pub room_id: String,
    pub origin_device_id: Uuid,
    pub ts_utc_ms: i64,
    /// Opaque client-defined storage key, e.g. `clips/<room>/<ts>_<device>_<hash>.txt`.
    pub object_key: String,
    pub provider_file_id: Option<String>,
    pub content_hash: Vec<u8>,
    pub size_bytes: i64,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPointerPublish {
    pub pointer: ClipboardItemPointer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPointerChanged {
    pub pointer: ClipboardItemPointer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Stable within a room; see [`crate::crypto::history_item_id`].
    pub id: String,
    pub room_id: String,
    pub kind: HistoryKind,
    pub origin_device_id: Uuid,
    pub ts_utc_ms: i64,
    /// Filename or leading text.
    pub title: String,
    pub preview: Option<String>,
    /// UTF-8 bytes for text, file size for files.
    pub size_bytes: i64,
    pub content_hash: Vec<u8>,
    pub content_type: String,
    pub provider_file_id: Option<String>,
    pub object_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryList {
    pub room_id: String,
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHistoryRequest {
    pub limit: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHistoryResponse {
    pub history: HistoryList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItemAdded {
    pub item: HistoryItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHistoryTextRequest {
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHistoryTextResponse {
    pub item_id: String,
    pub text: String,
}

/// Client → relay: publish a file payload (relay mode only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardFilePublish {
    pub device_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// First `max_chars` characters of `text`, used for history titles and previews.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Serialize any protocol message to binary (bincode).
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(msg)?)
}

/// Deserialize a protocol message from binary.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    Ok(bincode::deserialize(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 120), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("żółw", 2), "żó");
        assert_eq!(truncate_chars("", 5), "");
    }
    use crate::crypto::compute_text_hash;

    fn sample_pointer(provider_file_id: Option<String>) -> ClipboardItemPointer {
        ClipboardItemPointer {
            room_id: "room-test".into(),
            origin_device_id: Uuid::new_v4(),
            ts_utc_ms: 1_700_000_000_000,
            object_key: "clips/room-test/1.bin".into(),
            provider_file_id,
            content_hash: compute_text_hash("hello").unwrap().to_vec(),
            size_bytes: 5,
            content_type: "text".into(),
        }
    }

    #[test]
    fn test_publish_roundtrip_keeps_hash() {
        let text = "hello from test";
        let msg = ClipboardPublish {
            device_id: Uuid::new_v4(),
            client_item_id: Uuid::new_v4(),
            ts_client_utc_ms: 123,
            text: text.into(),
            text_hash: compute_text_hash(text).unwrap().to_vec(),
        };

        let restored: ClipboardPublish = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(restored, msg);
        assert_eq!(restored.text_hash.len(), 32);
    }

    #[test]
    fn test_pointer_roundtrip_with_and_without_provider_id() {
        for provider in [Some("file123".to_string()), None] {
            let msg = ClipboardPointerChanged {
                pointer: sample_pointer(provider),
            };
            let restored: ClipboardPointerChanged = decode(&encode(&msg).unwrap()).unwrap();
            assert_eq!(restored, msg);
        }
    }

    #[test]
    fn test_history_list_roundtrip() {
        let item = HistoryItem {
            id: "1_abc_DEF".into(),
            room_id: "room".into(),
            kind: HistoryKind::File,
            origin_device_id: Uuid::new_v4(),
            ts_utc_ms: 1,
            title: "report.pdf".into(),
            preview: None,
            size_bytes: 2048,
            content_hash: vec![7u8; 32],
            content_type: "application/pdf".into(),
            provider_file_id: None,
            object_key: Some("clips/room/1.bin".into()),
        };
        let msg = GetHistoryResponse {
            history: HistoryList {
                room_id: "room".into(),
                items: vec![item],
            },
        };

        let restored: GetHistoryResponse = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(restored, msg);
    }

    #[test]
    fn test_changed_encodes_origin_device_first() {
        let origin = Uuid::new_v4();
        let msg = ClipboardChanged {
            origin_device_id: origin,
            server_ts_utc_ms: 5,
            text: "x".into(),
            text_hash: vec![1u8; 32],
        };
        let bytes = encode(&msg).unwrap();
        // u64 length prefix, then the 16 uuid bytes
        assert_eq!(&bytes[8..24], origin.as_bytes());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode::<ClipboardChanged>(&[0xff, 0x01]).is_err());
    }
}
