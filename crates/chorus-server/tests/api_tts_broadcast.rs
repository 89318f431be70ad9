use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use chorus_server::{app, config::Config, AppState};
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower::ServiceExt;

fn broadcast(body: Value) -> Request<Body> {
    let mut request = Request::builder()
        .uri("/tts/broadcast")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40004);
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn empty_text_is_rejected() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(broadcast(json!({"text": "  "}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn oversized_text_is_rejected() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app
        .oneshot(broadcast(json!({"text": "x".repeat(1001)})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("maximum length"));
}

#[tokio::test]
async fn unknown_voice_is_rejected_with_allowed_set() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app
        .oneshot(broadcast(
            json!({"text": "attention please", "voice": "en-US-JennyNeural"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    let error = json["error"].as_str().unwrap();
    assert!(error.starts_with("Voice must be one of: "));
    assert!(error.contains("en-GB-SoniaNeural"));
}

#[tokio::test]
async fn unsupported_provider_is_rejected() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app
        .oneshot(broadcast(
            json!({"text": "attention please", "provider": "edge-tts"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("Unsupported TTS provider"));
}

#[tokio::test]
async fn invalid_rate_string_is_rejected() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app
        .oneshot(broadcast(
            json!({"text": "attention please", "rate": "fast"}),
        ))
        .await
        .unwrap();
    // parse_percent fails inside the TTS stage; audio errors map to 400.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
