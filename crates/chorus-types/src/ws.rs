//! WebSocket frame protocol for `/ws/{call_id}`.
//!
//! Frames are JSON objects tagged by `type`. Clients send audio or text for
//! processing and manage room membership; the server replies with pipeline
//! results, heartbeats, and error frames.

use crate::pipeline::PipelineResponse;
use serde::{Deserialize, Serialize};

/// Frames a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Run the full pipeline on base64-encoded audio.
    Audio {
        /// Base64-encoded WAV audio.
        data: String,
        language: Option<String>,
    },
    /// Run the text pipeline (no STT).
    Text { text: String },
    /// Liveness probe; answered with `pong`.
    Ping,
    /// Clear conversation history for this call.
    Reset,
    /// Join a broadcast room (e.g. `call_monitor`).
    JoinRoom { room: String },
    /// Leave a broadcast room.
    LeaveRoom { room: String },
}

/// Frames the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Result of an `audio` or `text` frame.
    PipelineResult(PipelineResponse),
    Pong,
    /// Periodic keep-alive.
    Heartbeat { timestamp: String },
    RoomJoined { room: String },
    RoomLeft { room: String },
    /// Conversation history cleared.
    ResetDone,
    /// Fan-out frame delivered to a room.
    RoomBroadcast {
        room: String,
        data: serde_json::Value,
        timestamp: String,
    },
    Error { message: String, code: String },
}
