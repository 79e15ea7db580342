//! Reconnecting relay session over WebSocket.
//!
//! One background task owns the socket. It reconnects with capped
//! exponential backoff and re-sends `JoinRoom` after every connect, so the
//! relay re-binds the room and pushes the latest state again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use clipsync_shared::protocol::{
    ClipboardFilePublish, ClipboardItemPointer, ClipboardPointerPublish, ClipboardPublish,
    GetHistoryRequest, GetHistoryTextRequest, HistoryList,
};
use clipsync_shared::wire::{ClientFrame, HubEvent, HubRequest, HubResponse, RpcError, ServerFrame};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::transport::RelayTransport;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(12);
const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_BASE_MS: u64 = 200;
const BACKOFF_MAX_MS: u64 = 30_000;
const EVENT_QUEUE: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingCalls = HashMap<u64, oneshot::Sender<Result<HubResponse, RpcError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Connected and the last `JoinRoom` succeeded.
    Joined,
    Closed,
}

struct Shared {
    hub_url: String,
    room: Mutex<(String, String)>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: Mutex<PendingCalls>,
    next_call: AtomicU64,
    state: watch::Sender<ConnectionState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Delay before reconnect attempt `attempt` (1-based).
fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << shift);
    Duration::from_millis(ms.min(BACKOFF_MAX_MS))
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn invoke(&self, request: HubRequest) -> Result<HubResponse, ClientError> {
        let method = request.method();
        let outgoing = lock(&self.outgoing)
            .clone()
            .ok_or(ClientError::NotConnected)?;

        let call_id = self.next_call.fetch_add(1, Ordering::Relaxed);
        let bytes = ClientFrame::Invoke { call_id, request }.to_bytes()?;

        let (done_tx, done_rx) = oneshot::channel();
        lock(&self.pending).insert(call_id, done_tx);

        if outgoing.send(Message::Binary(bytes)).is_err() {
            lock(&self.pending).remove(&call_id);
            return Err(ClientError::NotConnected);
        }

        match tokio::time::timeout(CALL_TIMEOUT, done_rx).await {
            Ok(Ok(outcome)) => outcome.map_err(ClientError::from),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                lock(&self.pending).remove(&call_id);
                debug!(method, call_id, "Call timed out");
                Err(ClientError::Timeout)
            }
        }
    }

    async fn rejoin(self: Arc<Self>) {
        let (room_id, room_secret) = lock(&self.room).clone();
        let request = HubRequest::JoinRoom {
            room_id: room_id.clone(),
            room_secret,
        };
        match self.invoke(request).await {
            Ok(_) => {
                self.set_state(ConnectionState::Joined);
                info!(room_id = %room_id, "Joined room");
            }
            Err(e) => warn!(room_id = %room_id, error = %e, "JoinRoom failed"),
        }
    }

    /// Never waits on the event consumer: it may itself be awaiting a
    /// completion that is queued behind this frame.
    fn handle_frame(&self, data: &[u8], events: &mpsc::Sender<HubEvent>) {
        match ServerFrame::from_bytes(data) {
            Ok(ServerFrame::Completion { call_id, outcome }) => {
                let waiter = lock(&self.pending).remove(&call_id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(outcome);
                    }
                    None => debug!(call_id, "Completion for unknown call"),
                }
            }
            Ok(ServerFrame::Event(event)) => match events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!("Event queue full, dropping hub event"),
                Err(TrySendError::Closed(_)) => debug!("Event receiver dropped"),
            },
            Err(e) => warn!(error = %e, "Ignoring undecodable frame"),
        }
    }

    /// Drive one connected socket until it closes.
    async fn run_socket(self: &Arc<Self>, ws: WsStream, events: &mpsc::Sender<HubEvent>) {
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        *lock(&self.outgoing) = Some(out_tx);
        self.set_state(ConnectionState::Connected);
        info!("Connected to relay");

        let join_task = tokio::spawn(self.clone().rejoin());

        let send_loop = async {
            while let Some(msg) = out_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        };
        let recv_loop = async {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Binary(data)) => self.handle_frame(&data, events),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "Socket read failed");
                        break;
                    }
                }
            }
        };

        tokio::select! {
            _ = send_loop => {}
            _ = recv_loop => {}
        }

        join_task.abort();
        *lock(&self.outgoing) = None;
        // Dropping the waiters fails in-flight calls with ConnectionClosed.
        lock(&self.pending).clear();
        info!("Disconnected from relay");
    }

    async fn run(self: Arc<Self>, events: mpsc::Sender<HubEvent>) {
        let mut attempt: u32 = 0;
        loop {
            self.set_state(ConnectionState::Connecting);
            debug!(attempt, "Connecting to relay");

            match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.hub_url.as_str())).await
            {
                Ok(Ok((ws, _))) => {
                    attempt = 0;
                    self.run_socket(ws, &events).await;
                }
                Ok(Err(e)) => warn!(attempt, error = %e, "Connect failed"),
                Err(_) => warn!(attempt, "Connect timed out after {:?}", CONNECT_TIMEOUT),
            }

            attempt = attempt.saturating_add(1);
            let delay = backoff_delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Handle to the relay session. Dropping it stops the background task.
pub struct RelayConnection {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl RelayConnection {
    /// Start connecting in the background. Hub events (broadcasts and
    /// convergence pushes) arrive on the returned receiver.
    pub fn start(config: &ClientConfig) -> Result<(Self, mpsc::Receiver<HubEvent>), ClientError> {
        let hub_url = config.hub_url()?;
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);

        let shared = Arc::new(Shared {
            hub_url,
            room: Mutex::new(config.join_credentials()),
            outgoing: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_call: AtomicU64::new(1),
            state: state_tx,
        });

        let task = tokio::spawn(shared.clone().run(events_tx));
        Ok((Self { shared, task }, events_rx))
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Wait until the connection reaches `state`, up to `timeout`.
    pub async fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.shared.state.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == state))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    pub async fn invoke(&self, request: HubRequest) -> Result<HubResponse, ClientError> {
        self.shared.invoke(request).await
    }

    pub fn close(&self) {
        self.task.abort();
        *lock(&self.shared.outgoing) = None;
        lock(&self.shared.pending).clear();
        self.shared.set_state(ConnectionState::Closed);
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl RelayTransport for RelayConnection {
    async fn join_room(&self, room_id: &str, room_secret: &str) -> Result<(), ClientError> {
        *lock(&self.shared.room) = (room_id.to_string(), room_secret.to_string());
        self.invoke(HubRequest::JoinRoom {
            room_id: room_id.to_string(),
            room_secret: room_secret.to_string(),
        })
        .await?;
        self.shared.set_state(ConnectionState::Joined);
        Ok(())
    }

    async fn publish_text(&self, publish: ClipboardPublish) -> Result<(), ClientError> {
        self.invoke(HubRequest::ClipboardPublish(publish)).await?;
        Ok(())
    }

    async fn publish_pointer(&self, pointer: ClipboardItemPointer) -> Result<(), ClientError> {
        self.invoke(HubRequest::ClipboardPointerPublish(ClipboardPointerPublish { pointer }))
            .await?;
        Ok(())
    }

    async fn publish_file(&self, publish: ClipboardFilePublish) -> Result<(), ClientError> {
        self.invoke(HubRequest::FilePublish(publish)).await?;
        Ok(())
    }

    async fn get_history(&self, limit: i32) -> Result<HistoryList, ClientError> {
        match self
            .invoke(HubRequest::GetHistory(GetHistoryRequest { limit }))
            .await?
        {
            HubResponse::History(resp) => Ok(resp.history),
            _ => Err(ClientError::UnexpectedResponse("GetHistory")),
        }
    }

    async fn get_history_text(&self, item_id: &str) -> Result<String, ClientError> {
        let request = HubRequest::GetHistoryText(GetHistoryTextRequest {
            item_id: item_id.to_string(),
        });
        match self.invoke(request).await? {
            HubResponse::HistoryText(resp) => Ok(resp.text),
            _ => Err(ClientError::UnexpectedResponse("GetHistoryText")),
        }
    }
}
