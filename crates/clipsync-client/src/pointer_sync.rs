//! Pointer-mode sync: content goes to a payload store the devices share,
//! and the relay only carries pointers to it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use clipsync_shared::crypto::{compute_hash, hash_to_hex};
use clipsync_shared::protocol::{truncate_chars, ClipboardItemPointer, HistoryItem};
use clipsync_shared::wire::HubEvent;
use clipsync_shared::{HistoryKind, LoopGuard};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::manifest::{HistoryManifest, ManifestItem, ManifestStore};
use crate::sync::LocalOutcome;
use crate::transport::{ClipboardAccess, RelayTransport};

/// Content type carried by text pointers.
pub const TEXT_POINTER_CONTENT_TYPE: &str = "text";
/// Items kept in the shared manifest by this engine.
pub const MANIFEST_ITEMS: usize = 10;
/// Title and preview length in the manifest, in characters.
pub const MANIFEST_TITLE_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPayload {
    pub provider_file_id: String,
    pub size_bytes: i64,
}

/// Blob storage reachable by every device in the room.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    async fn upload_text(
        &self,
        object_key: &str,
        text: &str,
    ) -> Result<UploadedPayload, ClientError>;

    async fn download_text(&self, provider_file_id: &str) -> Result<String, ClientError>;
}

/// `clips/{room}/{ts}_{device}_{HASH}.txt`
pub fn build_object_key(room_id: &str, ts_utc_ms: i64, device_id: Uuid, hash: &[u8]) -> String {
    format!(
        "clips/{room_id}/{ts_utc_ms}_{}_{}.txt",
        device_id.simple(),
        hash_to_hex(hash)
    )
}

pub struct PointerSync<T, S, C> {
    device_id: Uuid,
    room_id: String,
    max_text_bytes: usize,
    transport: Arc<T>,
    store: Arc<S>,
    clipboard: Arc<C>,
    manifests: Option<Arc<dyn ManifestStore>>,
    manifest_cache: Mutex<Option<HistoryManifest>>,
    guard: Arc<LoopGuard>,
}

impl<T, S, C> PointerSync<T, S, C>
where
    T: RelayTransport,
    S: PayloadStore,
    C: ClipboardAccess,
{
    pub fn new(
        config: &ClientConfig,
        transport: Arc<T>,
        store: Arc<S>,
        clipboard: Arc<C>,
        guard: Arc<LoopGuard>,
    ) -> Self {
        // Pointers are tagged with the room actually joined.
        let (room_id, _) = config.join_credentials();
        Self {
            device_id: config.device_id,
            room_id,
            max_text_bytes: config.max_text_bytes,
            transport,
            store,
            clipboard,
            manifests: None,
            manifest_cache: Mutex::new(None),
            guard,
        }
    }

    pub fn with_manifest_store(mut self, manifests: Arc<dyn ManifestStore>) -> Self {
        self.manifests = Some(manifests);
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Upload local text, then publish a pointer to it.
    ///
    /// Not transactional: an upload whose pointer publish fails stays in the
    /// store, and manifest failures are only logged.
    pub async fn on_local_text(
        &self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<LocalOutcome, ClientError> {
        if text.len() > self.max_text_bytes {
            warn!(
                bytes = text.len(),
                max = self.max_text_bytes,
                "Local text exceeds the client cap, skipping upload"
            );
            return Ok(LocalOutcome::TooLarge);
        }

        if self.guard.should_ignore_local_clipboard_event(now) {
            return Ok(LocalOutcome::RemoteEcho);
        }

        let hash = compute_hash(text.as_bytes());
        if self.guard.should_suppress_local_publish(now, &hash) {
            return Ok(LocalOutcome::Suppressed);
        }

        let ts_utc_ms = now.timestamp_millis();
        let object_key = build_object_key(&self.room_id, ts_utc_ms, self.device_id, &hash);
        debug!(key = %object_key, "Uploading payload");
        let uploaded = self.store.upload_text(&object_key, text).await?;

        let pointer = ClipboardItemPointer {
            room_id: self.room_id.clone(),
            origin_device_id: self.device_id,
            ts_utc_ms,
            object_key,
            provider_file_id: Some(uploaded.provider_file_id.clone()),
            content_hash: hash.to_vec(),
            size_bytes: uploaded.size_bytes,
            content_type: TEXT_POINTER_CONTENT_TYPE.to_string(),
        };
        self.transport.publish_pointer(pointer.clone()).await?;
        info!(
            file_id = %uploaded.provider_file_id,
            size = uploaded.size_bytes,
            "Pointer published"
        );

        if let Err(e) = self.record_in_manifest(&pointer, text).await {
            warn!(error = %e, "Manifest update failed");
        }

        Ok(LocalOutcome::Published)
    }

    async fn record_in_manifest(
        &self,
        pointer: &ClipboardItemPointer,
        text: &str,
    ) -> Result<(), ClientError> {
        let Some(manifests) = &self.manifests else {
            return Ok(());
        };

        let mut cache = self.manifest_cache.lock().await;
        if cache.is_none() {
            *cache = Some(manifests.load(&self.room_id).await?);
        }
        let Some(manifest) = cache.as_mut() else {
            return Ok(());
        };

        let title = truncate_chars(text, MANIFEST_TITLE_CHARS);
        manifest.append_or_replace(
            ManifestItem::from_pointer(pointer, HistoryKind::Text, title.clone(), Some(title)),
            MANIFEST_ITEMS,
        );
        manifests.save(manifest).await
    }

    /// Recent items from the shared manifest, newest first. The relay keeps
    /// no history in pointer mode, so this is the only listing there is.
    pub async fn manifest_history(&self) -> Result<Vec<HistoryItem>, ClientError> {
        let Some(manifests) = &self.manifests else {
            return Ok(Vec::new());
        };

        let mut cache = self.manifest_cache.lock().await;
        if cache.is_none() {
            *cache = Some(manifests.load(&self.room_id).await?);
        }
        Ok(cache
            .as_ref()
            .map(HistoryManifest::to_history_items)
            .unwrap_or_default())
    }

    /// Download and apply a remote pointer. Returns whether the clipboard
    /// was written.
    ///
    /// The ignore window opens when the download has finished, right before
    /// the clipboard write, however long the download took.
    pub async fn on_remote_pointer(
        &self,
        pointer: &ClipboardItemPointer,
    ) -> Result<bool, ClientError> {
        if LoopGuard::should_ignore_remote(self.device_id, pointer.origin_device_id) {
            debug!("Pointer from this device, ignoring");
            return Ok(false);
        }

        if pointer.room_id != self.room_id {
            debug!(room_id = %pointer.room_id, "Pointer for another room, ignoring");
            return Ok(false);
        }

        if !pointer
            .content_type
            .eq_ignore_ascii_case(TEXT_POINTER_CONTENT_TYPE)
        {
            info!(content_type = %pointer.content_type, "Pointer is not text, ignoring");
            return Ok(false);
        }

        let Some(file_id) = pointer
            .provider_file_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        else {
            warn!("Pointer has no provider file id, cannot download");
            return Ok(false);
        };

        let text = self.store.download_text(file_id).await?;
        self.guard.begin_remote_apply(Utc::now());
        self.clipboard.apply_remote_text(&text).await?;
        info!(file_id, bytes = text.len(), "Applied remote pointer");
        Ok(true)
    }

    /// Consume hub events until the connection's event channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<HubEvent>) {
        while let Some(event) = events.recv().await {
            if let HubEvent::ClipboardPointerChanged(changed) = event {
                if let Err(e) = self.on_remote_pointer(&changed.pointer).await {
                    warn!(error = %e, "Failed to apply pointer");
                }
            }
        }
    }
}
