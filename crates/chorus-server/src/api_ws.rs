//! WebSocket API handler and connection management for `/ws/{call_id}`.

use crate::api_pipeline::{decode_audio_payload, pipeline_response};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        ConnectInfo, Extension, Path, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use chorus_types::ws::{ClientFrame, ServerFrame};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::atomic::Ordering,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Maximum text length accepted in a `text` frame (matches the TTS input cap).
const MAX_WS_TEXT_LEN: usize = 65_536;

/// One live WebSocket session for a call.
struct Session {
    session_id: Uuid,
    tx: mpsc::Sender<String>,
    connected_at: chrono::DateTime<Utc>,
    messages_in: u64,
    messages_out: u64,
    rooms: HashSet<String>,
}

/// Per-connection summary reported by `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub call_id: String,
    pub connected_at: chrono::DateTime<Utc>,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub rooms: Vec<String>,
}

/// Type alias for the session map to satisfy clippy complexity checks.
type SessionMap = HashMap<String, Session>;

/// Manages active WebSocket connections and room membership.
#[derive(Clone)]
pub struct ConnectionManager {
    /// Active sessions: call_id -> session.
    sessions: Arc<RwLock<SessionMap>>,
    /// Rooms: room name -> set of call_ids.
    rooms: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            max_connections,
        }
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// True when the connection cap is reached. New upgrades are refused
    /// with 503 rather than queued.
    pub async fn is_full(&self) -> bool {
        self.sessions.read().await.len() >= self.max_connections
    }

    /// Registers a new session for a call.
    ///
    /// The cap check and insert happen under one lock, so racing upgrades
    /// cannot exceed `max_connections`; returns `None` when full.
    ///
    /// If the call already has a session (e.g. a reconnect racing its own
    /// disconnect), the old session is replaced without counting as a new
    /// slot, and its room memberships are cleaned up to prevent orphaned
    /// entries.
    pub async fn add_session(&self, call_id: String, tx: mpsc::Sender<String>) -> Option<Uuid> {
        let session_id = Uuid::new_v4();

        let old_rooms = {
            let mut sessions = self.sessions.write().await;
            if !sessions.contains_key(&call_id) && sessions.len() >= self.max_connections {
                return None;
            }
            let old = sessions.insert(
                call_id.clone(),
                Session {
                    session_id,
                    tx,
                    connected_at: Utc::now(),
                    messages_in: 0,
                    messages_out: 0,
                    rooms: HashSet::new(),
                },
            );
            old.map(|s| s.rooms)
        };

        if let Some(old_rooms) = old_rooms {
            if !old_rooms.is_empty() {
                let mut rooms = self.rooms.write().await;
                for room in &old_rooms {
                    if let Some(members) = rooms.get_mut(room) {
                        members.remove(&call_id);
                        if members.is_empty() {
                            rooms.remove(room);
                        }
                    }
                }
                tracing::info!(
                    call_id = %call_id,
                    "replaced existing WebSocket session; cleaned up old room memberships"
                );
            }
        }

        Some(session_id)
    }

    /// Removes a session for a call if the session ID matches.
    ///
    /// Lock ordering: sessions → rooms, consistently with `join_room` and
    /// `leave_room`, to prevent deadlocks.
    pub async fn remove_session(&self, call_id: &str, session_id: Uuid) {
        let joined_rooms = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(call_id) {
                Some(s) if s.session_id == session_id => {}
                // Stale removal request (session already replaced) or already gone.
                _ => return,
            }
            sessions.remove(call_id).map(|s| s.rooms)
        };

        if let Some(joined_rooms) = joined_rooms {
            let mut rooms = self.rooms.write().await;
            for room in &joined_rooms {
                if let Some(members) = rooms.get_mut(room) {
                    members.remove(call_id);
                    if members.is_empty() {
                        rooms.remove(room);
                    }
                }
            }
        }
    }

    /// Adds a call to a room.
    pub async fn join_room(&self, call_id: &str, room: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(call_id) {
            session.rooms.insert(room.to_string());
        }
        drop(sessions);

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(call_id.to_string());
    }

    /// Removes a call from a room.
    pub async fn leave_room(&self, call_id: &str, room: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(call_id) {
            session.rooms.remove(room);
        }
        drop(sessions);

        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(call_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Broadcasts a frame to every member of a room.
    pub async fn broadcast_to_room(&self, room: &str, data: serde_json::Value) {
        let frame = ServerFrame::RoomBroadcast {
            room: room.to_string(),
            data,
            timestamp: Utc::now().to_rfc3339(),
        };
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(room = %room, "failed to serialize room broadcast: {}", e);
                return;
            }
        };

        let members = {
            let rooms = self.rooms.read().await;
            match rooms.get(room) {
                Some(members) => members.clone(),
                None => return,
            }
        };

        let mut sessions = self.sessions.write().await;
        for call_id in &members {
            if let Some(session) = sessions.get_mut(call_id) {
                match session.tx.try_send(json.clone()) {
                    Ok(()) => session.messages_out += 1,
                    Err(e) => {
                        tracing::warn!(
                            call_id = %call_id,
                            room = %room,
                            "dropping room broadcast for slow consumer: {}",
                            e
                        );
                    }
                }
            }
        }
    }

    /// Sends a frame to a specific call's session.
    pub async fn send(&self, call_id: &str, frame: &ServerFrame) {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(call_id = %call_id, "failed to serialize frame: {}", e);
                return;
            }
        };

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(call_id) {
            match session.tx.try_send(json) {
                Ok(()) => session.messages_out += 1,
                Err(e) => {
                    tracing::warn!(
                        call_id = %call_id,
                        "dropping frame for slow consumer: {}",
                        e
                    );
                }
            }
        }
    }

    async fn record_incoming(&self, call_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(call_id) {
            session.messages_in += 1;
        }
    }

    /// Per-connection summaries for the stats endpoint.
    pub async fn connection_summaries(&self) -> Vec<ConnectionSummary> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(call_id, s)| ConnectionSummary {
                call_id: call_id.clone(),
                connected_at: s.connected_at,
                messages_received: s.messages_in,
                messages_sent: s.messages_out,
                rooms: s.rooms.iter().cloned().collect(),
            })
            .collect()
    }
}

/// WebSocket handler: `GET /ws/{call_id}`.
///
/// Refuses the upgrade with 503 when the connection cap is reached.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(call_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if call_id.trim().is_empty() || call_id.len() > 128 {
        tracing::warn!(remote_addr = %addr, "websocket connect with invalid call_id");
        return StatusCode::BAD_REQUEST.into_response();
    }

    if state.connection_manager.is_full().await {
        tracing::warn!(
            call_id = %call_id,
            remote_addr = %addr,
            "websocket connect refused: connection limit reached"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    tracing::info!(call_id = %call_id, remote_addr = %addr, "websocket connected");
    ws.on_upgrade(move |socket| handle_socket(socket, state, call_id))
}

/// Sends a JSON-serialized error frame over the session channel.
fn send_ws_error(tx: &mpsc::Sender<String>, message: String, code: &str) {
    let frame = ServerFrame::Error {
        message,
        code: code.to_string(),
    };
    match serde_json::to_string(&frame) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("failed to send WebSocket error to client: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize WebSocket error frame: {}", e);
        }
    }
}

fn send_frame(tx: &mpsc::Sender<String>, frame: &ServerFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("dropping frame for slow consumer: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize WebSocket frame: {}", e);
        }
    }
}

/// Runs the pipeline for one audio payload and pushes the result frame.
async fn run_audio_pipeline(
    state: &Arc<AppState>,
    call_id: &str,
    audio: &[u8],
    language: Option<&str>,
    tx: &mpsc::Sender<String>,
) {
    match state.pipeline.process_audio(call_id, audio, language).await {
        Ok(output) => {
            state.stats.record_pipeline(&output);
            send_frame(
                tx,
                &ServerFrame::PipelineResult(pipeline_response(call_id, output)),
            );
        }
        Err(e) => {
            state.stats.pipeline_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(call_id = %call_id, code = e.code(), "ws audio pipeline failed: {}", e);
            send_ws_error(tx, e.to_string(), e.code());
        }
    }
}

/// Handles the WebSocket connection.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, call_id: String) {
    // Bounded per-session channel so a slow consumer cannot grow memory
    // without limit; beyond the buffer, frames are dropped.
    let (tx, mut rx) = mpsc::channel::<String>(state.config.ws.queue_size);

    // The pre-upgrade is_full() check is advisory; this registration is the
    // authoritative cap check, so upgrades racing past it are closed here.
    let Some(session_id) = state
        .connection_manager
        .add_session(call_id.clone(), tx.clone())
        .await
    else {
        tracing::warn!(
            call_id = %call_id,
            "websocket closed after upgrade: connection limit reached"
        );
        let _ = socket.send(AxumMessage::Close(None)).await;
        return;
    };

    state
        .stats
        .ws_connections_total
        .fetch_add(1, Ordering::Relaxed);

    let (mut sender, mut receiver) = socket.split();

    // Forward frames from the session channel to the socket.
    let send_task = {
        let stats = state.stats.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                    break;
                }
                stats.ws_messages_out.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    // Periodic heartbeat so idle clients (and intermediaries) keep the
    // connection alive.
    let heartbeat_task = {
        let tx = tx.clone();
        let interval = Duration::from_secs(state.config.ws.heartbeat_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                let frame = ServerFrame::Heartbeat {
                    timestamp: Utc::now().to_rfc3339(),
                };
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if tx.send(json).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize heartbeat: {}", e);
                        break;
                    }
                }
            }
        })
    };

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            AxumMessage::Text(text) => {
                state.stats.ws_messages_in.fetch_add(1, Ordering::Relaxed);
                state.connection_manager.record_incoming(&call_id).await;

                let frame = match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(call_id = %call_id, "unparseable ws frame: {}", e);
                        send_ws_error(&tx, "invalid message format".to_string(), "WS_ERROR");
                        continue;
                    }
                };

                match frame {
                    ClientFrame::Audio { data, language } => {
                        let audio = match decode_audio_payload(&data) {
                            Ok(audio) => audio,
                            Err(e) => {
                                send_ws_error(&tx, e.to_string(), "VALIDATION_ERROR");
                                continue;
                            }
                        };
                        run_audio_pipeline(&state, &call_id, &audio, language.as_deref(), &tx)
                            .await;
                    }
                    ClientFrame::Text { text } => {
                        if text.trim().is_empty() {
                            send_ws_error(
                                &tx,
                                "text must not be empty".to_string(),
                                "VALIDATION_ERROR",
                            );
                            continue;
                        }
                        if text.len() > MAX_WS_TEXT_LEN {
                            send_ws_error(
                                &tx,
                                format!(
                                    "text exceeds maximum length of {} bytes",
                                    MAX_WS_TEXT_LEN
                                ),
                                "VALIDATION_ERROR",
                            );
                            continue;
                        }
                        match state.pipeline.process_text(&call_id, &text).await {
                            Ok(output) => {
                                state.stats.record_pipeline(&output);
                                send_frame(
                                    &tx,
                                    &ServerFrame::PipelineResult(pipeline_response(
                                        &call_id, output,
                                    )),
                                );
                            }
                            Err(e) => {
                                state.stats.pipeline_errors.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(
                                    call_id = %call_id,
                                    code = e.code(),
                                    "ws text pipeline failed: {}",
                                    e
                                );
                                send_ws_error(&tx, e.to_string(), e.code());
                            }
                        }
                    }
                    ClientFrame::Ping => {
                        send_frame(&tx, &ServerFrame::Pong);
                    }
                    ClientFrame::Reset => {
                        state.pipeline.ai().reset_conversation(Some(&call_id)).await;
                        tracing::info!(call_id = %call_id, "conversation reset");
                        send_frame(&tx, &ServerFrame::ResetDone);
                    }
                    ClientFrame::JoinRoom { room } => {
                        if room.trim().is_empty() {
                            send_ws_error(
                                &tx,
                                "room must not be empty".to_string(),
                                "VALIDATION_ERROR",
                            );
                            continue;
                        }
                        state.connection_manager.join_room(&call_id, &room).await;
                        send_frame(&tx, &ServerFrame::RoomJoined { room });
                    }
                    ClientFrame::LeaveRoom { room } => {
                        state.connection_manager.leave_room(&call_id, &room).await;
                        send_frame(&tx, &ServerFrame::RoomLeft { room });
                    }
                }
            }
            // Binary frames carry raw WAV audio, skipping the base64 step.
            AxumMessage::Binary(data) => {
                state.stats.ws_messages_in.fetch_add(1, Ordering::Relaxed);
                state.connection_manager.record_incoming(&call_id).await;
                run_audio_pipeline(&state, &call_id, &data, None, &tx).await;
            }
            AxumMessage::Close(_) => break,
            // Protocol-level ping/pong is handled by axum.
            _ => {}
        }
    }

    tracing::info!(call_id = %call_id, "websocket disconnected");

    state
        .connection_manager
        .remove_session(&call_id, session_id)
        .await;
    heartbeat_task.abort();
    send_task.abort();
}
