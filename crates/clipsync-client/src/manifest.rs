//! Pointer-mode history manifest.
//!
//! In pointer mode the relay never sees content, so devices keep a shared
//! JSON manifest of recent items next to the payloads themselves.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use clipsync_shared::crypto::{hash_to_hex, history_item_id};
use clipsync_shared::protocol::{ClipboardItemPointer, HistoryItem};
use clipsync_shared::HistoryKind;

use crate::error::ClientError;

pub const MANIFEST_CAPACITY_MIN: usize = 1;
pub const MANIFEST_CAPACITY_MAX: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub id: String,
    pub kind: HistoryKind,
    pub origin_device_id: Uuid,
    pub ts_utc_ms: i64,
    pub title: String,
    #[serde(default)]
    pub preview: Option<String>,
    pub size_bytes: i64,
    pub content_type: String,
    /// Upper-case hex.
    pub content_hash: String,
    #[serde(default)]
    pub provider_file_id: Option<String>,
    #[serde(default)]
    pub object_key: Option<String>,
}

impl ManifestItem {
    pub fn from_pointer(
        pointer: &ClipboardItemPointer,
        kind: HistoryKind,
        title: String,
        preview: Option<String>,
    ) -> Self {
        Self {
            id: history_item_id(
                pointer.ts_utc_ms,
                pointer.origin_device_id,
                &pointer.content_hash,
            ),
            kind,
            origin_device_id: pointer.origin_device_id,
            ts_utc_ms: pointer.ts_utc_ms,
            title,
            preview,
            size_bytes: pointer.size_bytes,
            content_type: pointer.content_type.clone(),
            content_hash: hash_to_hex(&pointer.content_hash),
            provider_file_id: pointer.provider_file_id.clone(),
            object_key: Some(pointer.object_key.clone()),
        }
    }

    pub fn to_history_item(&self, room_id: &str) -> HistoryItem {
        HistoryItem {
            id: self.id.clone(),
            room_id: room_id.to_string(),
            kind: self.kind,
            origin_device_id: self.origin_device_id,
            ts_utc_ms: self.ts_utc_ms,
            title: self.title.clone(),
            preview: self.preview.clone(),
            size_bytes: self.size_bytes,
            // A damaged hash field degrades to empty rather than failing the listing.
            content_hash: hex::decode(&self.content_hash).unwrap_or_default(),
            content_type: self.content_type.clone(),
            provider_file_id: self.provider_file_id.clone(),
            object_key: self.object_key.clone(),
        }
    }
}

/// Newest-first list of items for one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryManifest {
    pub room_id: String,
    #[serde(default)]
    pub items: Vec<ManifestItem>,
}

impl HistoryManifest {
    pub fn empty(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            items: Vec::new(),
        }
    }

    /// Drop any entry with the same id, insert at the front, trim to
    /// `max_items` (clamped to 1..=200).
    pub fn append_or_replace(&mut self, item: ManifestItem, max_items: usize) {
        let max_items = max_items.clamp(MANIFEST_CAPACITY_MIN, MANIFEST_CAPACITY_MAX);
        self.items.retain(|existing| existing.id != item.id);
        self.items.insert(0, item);
        self.items.truncate(max_items);
    }

    pub fn to_history_items(&self) -> Vec<HistoryItem> {
        self.items
            .iter()
            .map(|item| item.to_history_item(&self.room_id))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Where the manifest lives. Load failures for corrupt data must yield an
/// empty manifest rather than an error.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    async fn load(&self, room_id: &str) -> Result<HistoryManifest, ClientError>;

    async fn save(&self, manifest: &HistoryManifest) -> Result<(), ClientError>;
}

/// Manifest files in a local (or synced) directory: `manifest.{room}.json`.
pub struct FsManifestStore {
    dir: PathBuf,
}

impl FsManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, room_id: &str) -> PathBuf {
        manifest_path(&self.dir, room_id)
    }
}

fn manifest_path(dir: &Path, room_id: &str) -> PathBuf {
    let safe: String = room_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("manifest.{safe}.json"))
}

#[async_trait]
impl ManifestStore for FsManifestStore {
    async fn load(&self, room_id: &str) -> Result<HistoryManifest, ClientError> {
        let path = self.path_for(room_id);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HistoryManifest::empty(room_id))
            }
            Err(e) => return Err(e.into()),
        };

        match HistoryManifest::from_json(&json) {
            Ok(mut manifest) => {
                manifest.room_id = room_id.to_string();
                debug!(room_id, items = manifest.items.len(), "Manifest loaded");
                Ok(manifest)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt manifest, starting empty");
                Ok(HistoryManifest::empty(room_id))
            }
        }
    }

    async fn save(&self, manifest: &HistoryManifest) -> Result<(), ClientError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&manifest.room_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, manifest.to_json()?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
