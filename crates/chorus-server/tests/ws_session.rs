//! WebSocket session tests against a real listener.

use chorus_server::{app, config::Config, AppState};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn spawn_server(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::new(config).unwrap();
    // AppState clones share all interior state (counters, sessions,
    // conversations), so the returned copy observes the server's.
    let app = app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

/// Receives frames until one with the given `type` tag arrives, skipping
/// heartbeats.
async fn recv_frame_of_type(
    ws: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    frame_type: &str,
) -> Value {
    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(&text).unwrap();
            if frame["type"] == frame_type {
                return frame;
            }
        }
    }
}

#[tokio::test]
async fn ping_pong() {
    let (addr, _state) = spawn_server(Config::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/call-ping", addr))
        .await
        .unwrap();

    ws.send(Message::text(r#"{"type":"ping"}"#)).await.unwrap();
    let frame = recv_frame_of_type(&mut ws, "pong").await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn heartbeat_arrives_on_schedule() {
    let mut config = Config::default();
    config.ws.heartbeat_interval_secs = 1;
    let (addr, _state) = spawn_server(config).await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws/call-hb", addr))
        .await
        .unwrap();

    let frame = recv_frame_of_type(&mut ws, "heartbeat").await;
    assert!(frame["timestamp"].is_string());
}

#[tokio::test]
async fn invalid_frame_yields_error() {
    let (addr, _state) = spawn_server(Config::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/call-bad", addr))
        .await
        .unwrap();

    ws.send(Message::text(r#"{"type":"selfdestruct"}"#))
        .await
        .unwrap();
    let frame = recv_frame_of_type(&mut ws, "error").await;
    assert_eq!(frame["code"], "WS_ERROR");
}

#[tokio::test]
async fn empty_text_frame_yields_validation_error() {
    let (addr, _state) = spawn_server(Config::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/call-empty", addr))
        .await
        .unwrap();

    ws.send(Message::text(r#"{"type":"text","text":"   "}"#))
        .await
        .unwrap();
    let frame = recv_frame_of_type(&mut ws, "error").await;
    assert_eq!(frame["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn text_without_api_key_yields_config_error() {
    let mut config = Config::default();
    config.ai.api_key = String::new();
    let (addr, _state) = spawn_server(config).await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws/call-noai", addr))
        .await
        .unwrap();

    ws.send(Message::text(r#"{"type":"text","text":"hello"}"#))
        .await
        .unwrap();
    let frame = recv_frame_of_type(&mut ws, "error").await;
    assert_eq!(frame["code"], "CONFIG_ERROR");
}

#[tokio::test]
async fn room_join_and_leave() {
    let (addr, _state) = spawn_server(Config::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/call-rooms", addr))
        .await
        .unwrap();

    ws.send(Message::text(r#"{"type":"join_room","room":"queue_monitor"}"#))
        .await
        .unwrap();
    let frame = recv_frame_of_type(&mut ws, "room_joined").await;
    assert_eq!(frame["room"], "queue_monitor");

    ws.send(Message::text(r#"{"type":"leave_room","room":"queue_monitor"}"#))
        .await
        .unwrap();
    let frame = recv_frame_of_type(&mut ws, "room_left").await;
    assert_eq!(frame["room"], "queue_monitor");
}

#[tokio::test]
async fn reset_clears_conversation() {
    let (addr, _state) = spawn_server(Config::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/call-reset", addr))
        .await
        .unwrap();

    ws.send(Message::text(r#"{"type":"reset"}"#)).await.unwrap();
    let frame = recv_frame_of_type(&mut ws, "reset_done").await;
    assert_eq!(frame["type"], "reset_done");
}

#[tokio::test]
async fn connection_cap_refuses_upgrade() {
    let mut config = Config::default();
    config.ws.max_connections = 1;
    let (addr, _state) = spawn_server(config).await;

    let (_ws, _) = connect_async(format!("ws://{}/ws/call-first", addr))
        .await
        .unwrap();

    // The second upgrade is refused with a non-101 response.
    let err = connect_async(format!("ws://{}/ws/call-second", addr))
        .await
        .unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 503);
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}

#[tokio::test]
async fn session_state_tracks_activity_and_disconnect() {
    let (addr, state) = spawn_server(Config::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/call-stats", addr))
        .await
        .unwrap();

    ws.send(Message::text(r#"{"type":"ping"}"#)).await.unwrap();
    recv_frame_of_type(&mut ws, "pong").await;

    assert_eq!(state.connection_manager.active_count().await, 1);
    let summaries = state.connection_manager.connection_summaries().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].call_id, "call-stats");
    assert!(summaries[0].messages_received >= 1);

    ws.close(None).await.unwrap();
    // Give the server a moment to run its cleanup path.
    for _ in 0..50 {
        if state.connection_manager.active_count().await == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(state.connection_manager.active_count().await, 0);
}
