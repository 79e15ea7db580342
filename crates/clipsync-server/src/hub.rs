//! The relay hub: per-session join state and the session RPCs.
//!
//! A [`Session`] is created when a socket connects and dropped when it
//! closes. It is bound to at most one room key for its whole life; every
//! RPC after `JoinRoom` reads and writes the stores under that key only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use axum::body::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use clipsync_shared::constants::{
    DEFAULT_FILE_CONTENT_TYPE, DEFAULT_FILE_NAME, DEFAULT_ROOM_ID, HASH_SIZE, MAX_FILE_BYTES,
    MAX_TEXT_BYTES, PREVIEW_CHARS, TEXT_CONTENT_TYPE,
};
use clipsync_shared::crypto::{compute_hash, hash_equals, hash_to_hex, history_item_id};
use clipsync_shared::protocol::{
    truncate_chars, ClipboardChanged, ClipboardFilePublish, ClipboardItemPointer,
    ClipboardPointerChanged, ClipboardPointerPublish, ClipboardPublish, GetHistoryResponse,
    GetHistoryTextResponse, HistoryItem, HistoryItemAdded, HistoryList,
};
use clipsync_shared::wire::{HubEvent, HubRequest, HubResponse, ServerFrame};
use clipsync_shared::{HistoryKind, RoomKey};

use crate::auth::{AuthService, Principal};
use crate::config::ServerConfig;
use crate::error::HubError;
use crate::file_store::FilePayloadStore;
use crate::groups::{BroadcastGroups, Outbound, SessionId};
use crate::history::HistoryState;
use crate::rooms::RoomRegistry;
use crate::state::{ClipboardState, PointerState};

/// The room a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRoom {
    /// Logical room id as the client sent it.
    pub room_id: String,
    pub room_key: RoomKey,
}

/// Per-connection context. Never shared between connections.
pub struct Session {
    id: SessionId,
    principal: Option<Principal>,
    outbound: Outbound,
    joined: OnceLock<JoinedRoom>,
    closed: AtomicBool,
}

impl Session {
    pub fn new(principal: Option<Principal>, outbound: Outbound) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal,
            outbound,
            joined: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn joined(&self) -> Option<&JoinedRoom> {
        self.joined.get()
    }

    /// True once the socket has gone and [`Hub::disconnect`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn require_joined(&self) -> Result<&JoinedRoom, HubError> {
        self.joined.get().ok_or(HubError::NotJoined)
    }

    /// Queue a frame for this session only. Returns false once the socket is gone.
    pub async fn send(&self, frame: ServerFrame) -> bool {
        self.outbound.send(frame).await.is_ok()
    }

    async fn push(&self, event: HubEvent) {
        if !self.send(ServerFrame::Event(event)).await {
            debug!(session = %self.id, "Session closed before convergence push");
        }
    }
}

/// Shared relay state. Cheap to clone; every store is internally synchronized.
#[derive(Clone)]
pub struct Hub {
    auth: AuthService,
    rooms: RoomRegistry,
    clipboard: ClipboardState,
    pointers: PointerState,
    history: HistoryState,
    files: FilePayloadStore,
    groups: BroadcastGroups,
}

impl Hub {
    pub fn new(config: &ServerConfig, auth: AuthService) -> Self {
        Self {
            auth,
            rooms: RoomRegistry::new(),
            clipboard: ClipboardState::new(),
            pointers: PointerState::new(),
            history: HistoryState::new(config.history_capacity),
            files: FilePayloadStore::new(MAX_FILE_BYTES),
            groups: BroadcastGroups::new(),
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn files(&self) -> &FilePayloadStore {
        &self.files
    }

    pub fn groups(&self) -> &BroadcastGroups {
        &self.groups
    }

    /// Route one session RPC.
    pub async fn dispatch(
        &self,
        session: &Session,
        request: HubRequest,
    ) -> Result<HubResponse, HubError> {
        debug!(session = %session.id, method = request.method(), "Invoke");
        match request {
            HubRequest::JoinRoom {
                room_id,
                room_secret,
            } => {
                self.join_room(session, &room_id, &room_secret).await?;
                Ok(HubResponse::Joined)
            }
            HubRequest::ClipboardPublish(msg) => {
                self.publish_text(session, msg).await?;
                Ok(HubResponse::Published)
            }
            HubRequest::ClipboardPointerPublish(msg) => {
                self.publish_pointer(session, msg).await?;
                Ok(HubResponse::Published)
            }
            HubRequest::FilePublish(msg) => {
                self.publish_file(session, msg).await?;
                Ok(HubResponse::Published)
            }
            HubRequest::GetHistory(req) => {
                let history = self.get_history(session, req.limit).await?;
                Ok(HubResponse::History(GetHistoryResponse { history }))
            }
            HubRequest::GetHistoryText(req) => {
                let text = self.get_history_text(session, &req.item_id).await?;
                Ok(HubResponse::HistoryText(text))
            }
        }
    }

    /// Bind the session to a room key and push the room's latest state to it.
    ///
    /// With auth enabled the key is `{subject}|{roomId}` and the secret is
    /// ignored. Otherwise the room registry checks the shared secret and the
    /// key is the room id itself. Joining the same key again only repeats the
    /// convergence push.
    pub async fn join_room(
        &self,
        session: &Session,
        room_id: &str,
        room_secret: &str,
    ) -> Result<(), HubError> {
        let candidate = if self.auth.enabled() {
            let principal = session.principal.as_ref().ok_or_else(|| {
                HubError::InvalidCredential(
                    "authentication required: connect with a relay bearer token".into(),
                )
            })?;
            let room_id = if room_id.trim().is_empty() {
                DEFAULT_ROOM_ID
            } else {
                room_id
            };
            JoinedRoom {
                room_id: room_id.to_string(),
                room_key: RoomKey::for_subject(&principal.subject, room_id),
            }
        } else {
            if !self
                .rooms
                .ensure_room_and_validate_secret(room_id, room_secret)
                .await
            {
                warn!(session = %session.id, room_id = %room_id, "Join rejected: bad room id or secret");
                return Err(HubError::InvalidCredential(
                    "invalid room id or secret".into(),
                ));
            }
            JoinedRoom {
                room_id: room_id.to_string(),
                room_key: RoomKey::shared(room_id),
            }
        };

        if let Err(candidate) = session.joined.set(candidate) {
            let already = session.joined.get().map(|j| &j.room_key);
            if already != Some(&candidate.room_key) {
                return Err(HubError::Validation(
                    "session is already joined to a different room".into(),
                ));
            }
        }
        let joined = session.require_joined()?;

        self.groups
            .join(&joined.room_key, session.id, session.outbound.clone())
            .await;

        // A join still in flight when the socket closed must not stay in the group.
        if session.is_closed() {
            self.groups.leave(&joined.room_key, &session.id).await;
            debug!(session = %session.id, "Session closed during join");
            return Ok(());
        }

        // Convergence: pointer first, then text, to the caller only.
        if let Some(pointer) = self.pointers.get_latest(&joined.room_key).await {
            session
                .push(HubEvent::ClipboardPointerChanged(ClipboardPointerChanged {
                    pointer,
                }))
                .await;
        }
        if let Some(changed) = self.clipboard.get_latest(&joined.room_key).await {
            session.push(HubEvent::ClipboardChanged(changed)).await;
        }

        info!(
            session = %session.id,
            room_key = %joined.room_key,
            auth = self.auth.enabled(),
            "Session joined room"
        );
        Ok(())
    }

    pub async fn publish_text(
        &self,
        session: &Session,
        msg: ClipboardPublish,
    ) -> Result<(), HubError> {
        let joined = session.require_joined()?;

        if msg.device_id.is_nil() {
            return Err(HubError::Validation("deviceId is required".into()));
        }
        if msg.client_item_id.is_nil() {
            return Err(HubError::Validation("clientItemId is required".into()));
        }
        if msg.text.len() > MAX_TEXT_BYTES {
            return Err(HubError::Validation(format!(
                "text exceeds max of {MAX_TEXT_BYTES} UTF-8 bytes"
            )));
        }

        let computed = compute_hash(msg.text.as_bytes());
        let text_hash = if msg.text_hash.len() == HASH_SIZE && hash_equals(&msg.text_hash, &computed)
        {
            msg.text_hash
        } else {
            debug!(
                session = %session.id,
                device = %msg.device_id,
                client_item = %msg.client_item_id,
                "Client hash missing or mismatched, using computed hash"
            );
            computed.to_vec()
        };

        let server_ts = Utc::now().timestamp_millis();
        let changed = ClipboardChanged {
            origin_device_id: msg.device_id,
            server_ts_utc_ms: server_ts,
            text: msg.text,
            text_hash,
        };
        self.clipboard
            .set_latest(&joined.room_key, changed.clone())
            .await;

        let summary = truncate_chars(&changed.text, PREVIEW_CHARS);
        let item = HistoryItem {
            id: history_item_id(server_ts, changed.origin_device_id, &changed.text_hash),
            room_id: joined.room_id.clone(),
            kind: HistoryKind::Text,
            origin_device_id: changed.origin_device_id,
            ts_utc_ms: server_ts,
            title: summary.clone(),
            preview: Some(summary),
            size_bytes: changed.text.len() as i64,
            content_hash: changed.text_hash.clone(),
            content_type: TEXT_CONTENT_TYPE.to_string(),
            provider_file_id: None,
            object_key: None,
        };
        self.history
            .append(&joined.room_key, item.clone(), Some(changed.text.clone()))
            .await;

        debug!(
            room_key = %joined.room_key,
            bytes = changed.text.len(),
            hash = %hash_to_hex(&changed.text_hash),
            "Clipboard text published"
        );

        self.groups
            .broadcast(&joined.room_key, HubEvent::ClipboardChanged(changed))
            .await;
        self.groups
            .broadcast(
                &joined.room_key,
                HubEvent::HistoryItemAdded(HistoryItemAdded { item }),
            )
            .await;
        Ok(())
    }

    pub async fn publish_pointer(
        &self,
        session: &Session,
        msg: ClipboardPointerPublish,
    ) -> Result<(), HubError> {
        let joined = session.require_joined()?;
        let mut pointer = msg.pointer;

        if pointer.room_id != joined.room_id {
            if self.auth.enabled() {
                // Scoping is by room key, which the pointer cannot forge.
                warn!(
                    session = %session.id,
                    pointer_room = %pointer.room_id,
                    joined_room = %joined.room_id,
                    "Pointer roomId does not match joined room, normalizing"
                );
                pointer.room_id = joined.room_id.clone();
            } else {
                return Err(HubError::Validation(
                    "pointer roomId does not match the joined room".into(),
                ));
            }
        }

        validate_pointer(&pointer)?;

        self.pointers
            .set_latest(&joined.room_key, pointer.clone())
            .await;

        debug!(
            room_key = %joined.room_key,
            object_key = %pointer.object_key,
            size = pointer.size_bytes,
            "Clipboard pointer published"
        );

        self.groups
            .broadcast(
                &joined.room_key,
                HubEvent::ClipboardPointerChanged(ClipboardPointerChanged { pointer }),
            )
            .await;
        Ok(())
    }

    pub async fn publish_file(
        &self,
        session: &Session,
        msg: ClipboardFilePublish,
    ) -> Result<(), HubError> {
        let joined = session.require_joined()?;

        if msg.device_id.is_nil() {
            return Err(HubError::Validation("deviceId is required".into()));
        }
        if msg.bytes.is_empty() {
            return Err(HubError::Validation("bytes are required".into()));
        }
        if msg.bytes.len() > MAX_FILE_BYTES {
            return Err(HubError::Validation(format!(
                "file exceeds max of {MAX_FILE_BYTES} bytes"
            )));
        }

        let file_name = non_empty_or(msg.file_name, DEFAULT_FILE_NAME);
        let content_type = non_empty_or(msg.content_type, DEFAULT_FILE_CONTENT_TYPE);

        let hash = compute_hash(&msg.bytes);
        let ts = Utc::now().timestamp_millis();
        let id = history_item_id(ts, msg.device_id, &hash);
        let size_bytes = msg.bytes.len() as i64;

        self.files
            .put(&joined.room_key, &id, Bytes::from(msg.bytes))
            .await?;

        let item = HistoryItem {
            id,
            room_id: joined.room_id.clone(),
            kind: HistoryKind::File,
            origin_device_id: msg.device_id,
            ts_utc_ms: ts,
            title: file_name,
            preview: None,
            size_bytes,
            content_hash: hash.to_vec(),
            content_type,
            provider_file_id: None,
            object_key: None,
        };
        self.history
            .append(&joined.room_key, item.clone(), None)
            .await;

        info!(
            room_key = %joined.room_key,
            item = %item.id,
            size = size_bytes,
            "File published"
        );

        self.groups
            .broadcast(
                &joined.room_key,
                HubEvent::HistoryItemAdded(HistoryItemAdded { item }),
            )
            .await;
        Ok(())
    }

    pub async fn get_history(&self, session: &Session, limit: i32) -> Result<HistoryList, HubError> {
        let joined = session.require_joined()?;
        let items = self.history.get_history(&joined.room_key, limit).await;
        Ok(HistoryList {
            room_id: joined.room_id.clone(),
            items,
        })
    }

    pub async fn get_history_text(
        &self,
        session: &Session,
        item_id: &str,
    ) -> Result<GetHistoryTextResponse, HubError> {
        let joined = session.require_joined()?;
        if item_id.trim().is_empty() {
            return Err(HubError::Validation("itemId is required".into()));
        }
        let text = self
            .history
            .get_text(&joined.room_key, item_id)
            .await
            .ok_or_else(|| HubError::NotFound(format!("history item {item_id} not found")))?;
        Ok(GetHistoryTextResponse {
            item_id: item_id.to_string(),
            text,
        })
    }

    /// Drop the session from its broadcast group. Joins that complete
    /// afterwards remove themselves.
    pub async fn disconnect(&self, session: &Session) {
        session.closed.store(true, Ordering::SeqCst);
        if let Some(joined) = session.joined() {
            self.groups.leave(&joined.room_key, &session.id).await;
        }
    }
}

fn validate_pointer(pointer: &ClipboardItemPointer) -> Result<(), HubError> {
    if pointer.origin_device_id.is_nil() {
        return Err(HubError::Validation("originDeviceId is required".into()));
    }
    if pointer.ts_utc_ms <= 0 {
        return Err(HubError::Validation("tsUtcMs must be positive".into()));
    }
    if pointer.object_key.trim().is_empty() {
        return Err(HubError::Validation("objectKey is required".into()));
    }
    if pointer.content_hash.len() != HASH_SIZE {
        return Err(HubError::Validation(format!(
            "contentHash must be {HASH_SIZE} bytes"
        )));
    }
    if pointer.size_bytes < 0 {
        return Err(HubError::Validation("sizeBytes must not be negative".into()));
    }
    if pointer.content_type.trim().is_empty() {
        return Err(HubError::Validation("contentType is required".into()));
    }
    Ok(())
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}
