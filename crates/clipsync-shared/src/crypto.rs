use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::constants::{HASH_SIZE, MAX_TEXT_BYTES};
use crate::error::ProtocolError;

pub type ContentHash = [u8; HASH_SIZE];

pub fn compute_hash(bytes: &[u8]) -> ContentHash {
    let digest = Sha256::digest(bytes);
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(&digest);
    hash
}

/// SHA-256 over the UTF-8 bytes of `text`.
///
/// Clients use this for duplicate suppression and the relay uses it to
/// verify client-supplied hashes. Text over the protocol cap is rejected.
pub fn compute_text_hash(text: &str) -> Result<ContentHash, ProtocolError> {
    if text.len() > MAX_TEXT_BYTES {
        return Err(ProtocolError::TextTooLarge {
            size: text.len(),
            max: MAX_TEXT_BYTES,
        });
    }
    Ok(compute_hash(text.as_bytes()))
}

/// Constant-time comparison; differing lengths never match.
pub fn hash_equals(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).unwrap_u8() == 1
}

pub fn hash_to_hex(hash: &[u8]) -> String {
    hex::encode_upper(hash)
}

// SHA-256(room_id || "\n" || secret); salted by room so equal secrets differ across rooms
pub fn room_secret_hash(room_id: &str, secret: &str) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(room_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(secret.as_bytes());
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Deterministic history item id: `{ts}_{device}_{HASH}`.
///
/// Publishing identical content from the same device at the same instant
/// yields the same id.
pub fn history_item_id(ts_utc_ms: i64, origin_device_id: Uuid, content_hash: &[u8]) -> String {
    format!(
        "{}_{}_{}",
        ts_utc_ms,
        origin_device_id.simple(),
        hash_to_hex(content_hash)
    )
}
