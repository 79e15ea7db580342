//! Relay-mode text sync: the relay carries the clipboard text itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use clipsync_shared::crypto::{compute_hash, hash_to_hex};
use clipsync_shared::protocol::{ClipboardChanged, ClipboardPublish};
use clipsync_shared::wire::HubEvent;
use clipsync_shared::LoopGuard;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::transport::{ClipboardAccess, RelayTransport};

/// What happened to a local clipboard change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOutcome {
    Published,
    /// Larger than the client's text cap.
    TooLarge,
    /// Inside the ignore window after applying a remote update.
    RemoteEcho,
    /// Debounced, or same content as the last publish.
    Suppressed,
}

pub struct TextSync<T, C> {
    device_id: Uuid,
    max_text_bytes: usize,
    transport: Arc<T>,
    clipboard: Arc<C>,
    guard: Arc<LoopGuard>,
}

impl<T: RelayTransport, C: ClipboardAccess> TextSync<T, C> {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<T>,
        clipboard: Arc<C>,
        guard: Arc<LoopGuard>,
    ) -> Self {
        Self {
            device_id: config.device_id,
            max_text_bytes: config.max_text_bytes,
            transport,
            clipboard,
            guard,
        }
    }

    /// Local clipboard text changed at `now`.
    pub async fn on_local_text(
        &self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<LocalOutcome, ClientError> {
        if text.len() > self.max_text_bytes {
            warn!(
                bytes = text.len(),
                max = self.max_text_bytes,
                "Local text exceeds the client cap, not publishing"
            );
            return Ok(LocalOutcome::TooLarge);
        }

        if self.guard.should_ignore_local_clipboard_event(now) {
            debug!("Local change inside the remote-apply window, ignoring");
            return Ok(LocalOutcome::RemoteEcho);
        }

        let hash = compute_hash(text.as_bytes());
        if self.guard.should_suppress_local_publish(now, &hash) {
            return Ok(LocalOutcome::Suppressed);
        }

        self.transport
            .publish_text(ClipboardPublish {
                device_id: self.device_id,
                client_item_id: Uuid::new_v4(),
                ts_client_utc_ms: now.timestamp_millis(),
                text: text.to_string(),
                text_hash: hash.to_vec(),
            })
            .await?;

        debug!(bytes = text.len(), hash = %hash_to_hex(&hash), "Published local text");
        Ok(LocalOutcome::Published)
    }

    /// Apply a remote update unless it came from this device.
    /// Returns whether the clipboard was written.
    pub async fn on_remote_changed(
        &self,
        changed: &ClipboardChanged,
        now: DateTime<Utc>,
    ) -> Result<bool, ClientError> {
        if LoopGuard::should_ignore_remote(self.device_id, changed.origin_device_id) {
            debug!("Remote update from this device, ignoring");
            return Ok(false);
        }

        self.guard.begin_remote_apply(now);
        self.clipboard.apply_remote_text(&changed.text).await?;
        info!(
            origin = %changed.origin_device_id,
            bytes = changed.text.len(),
            "Applied remote clipboard text"
        );
        Ok(true)
    }

    /// Consume hub events until the connection's event channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<HubEvent>) {
        while let Some(event) = events.recv().await {
            if let HubEvent::ClipboardChanged(changed) = event {
                if let Err(e) = self.on_remote_changed(&changed, Utc::now()).await {
                    warn!(error = %e, "Remote apply failed");
                }
            }
        }
    }
}
