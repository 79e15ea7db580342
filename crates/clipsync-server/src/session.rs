//! WebSocket transport for hub sessions.
//!
//! Each binary frame carries one bincode envelope. Invocations are spawned
//! as independent tasks so a slow RPC never holds up the rest of the
//! session; replies and events share one outbound queue per socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use clipsync_shared::wire::{ClientFrame, RpcError, ServerFrame};

use crate::api::{bearer_from_headers, AppState};
use crate::auth::Principal;
use crate::error::ServerError;
use crate::hub::{Hub, Session};

/// Per-session outbound queue depth. Broadcasts to a full queue are dropped.
const OUTBOUND_QUEUE: usize = 256;

#[derive(Debug, Deserialize)]
pub struct HubQuery {
    access_token: Option<String>,
}

/// `GET /hub/clipboard`: authenticate the upgrade, then run the session.
///
/// A bearer token may arrive as `?access_token=` or an `Authorization`
/// header. An invalid token refuses the upgrade; a missing one yields an
/// anonymous session whose `JoinRoom` fails when auth is on.
pub async fn hub_socket(
    State(state): State<AppState>,
    Query(query): Query<HubQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let token = query
        .access_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| bearer_from_headers(&headers).map(String::from));

    let principal = match token {
        Some(token) if state.hub.auth().enabled() => Some(
            state
                .hub
                .auth()
                .authenticate(&token)
                .map_err(|e| ServerError::Unauthorized(e.to_string()))?,
        ),
        _ => None,
    };

    let hub = state.hub.clone();
    Ok(ws
        .max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| run_session(socket, hub, principal)))
}

pub async fn run_session(socket: WebSocket, hub: Hub, principal: Option<Principal>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_QUEUE);
    let session = Arc::new(Session::new(principal, out_tx));
    let session_id = session.id();

    info!(
        session = %session_id,
        subject = session.principal().map(|p| p.subject.as_str()).unwrap_or("-"),
        "Session connected"
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let bytes = match frame.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "Failed to encode outbound frame");
                    continue;
                }
            };
            if ws_tx.send(Message::Binary(bytes)).await.is_err() {
                break;
            }
        }
    });

    let recv_hub = hub.clone();
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            let data = match msg {
                Ok(Message::Binary(data)) => data,
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(_)) => {
                    warn!(session = %session_id, "Ignoring text frame");
                    continue;
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!(session = %session_id, error = %e, "Socket read failed");
                    break;
                }
            };

            let frame = match ClientFrame::from_bytes(&data) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(session = %session_id, error = %e, len = data.len(), "Ignoring undecodable frame");
                    continue;
                }
            };
            let ClientFrame::Invoke { call_id, request } = frame;

            let hub = recv_hub.clone();
            let session = recv_session.clone();
            tokio::spawn(async move {
                let method = request.method();
                let outcome = hub.dispatch(&session, request).await.map_err(|e| {
                    debug!(session = %session.id(), method, error = %e, "Invocation failed");
                    RpcError::from(e)
                });
                session
                    .send(ServerFrame::Completion { call_id, outcome })
                    .await;
            });
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.disconnect(&session).await;
    info!(session = %session_id, "Session disconnected");
}
