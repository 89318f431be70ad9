use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use chorus_server::{app, config::Config, AppState};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower::ServiceExt;

fn test_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40000)
}

fn get(uri: &str) -> Request<Body> {
    let mut request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(test_addr()));
    request
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn root_banner_lists_endpoints() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["service"], "chorus");
    assert_eq!(json["status"], "running");
    assert_eq!(json["endpoints"]["websocket"], "/ws/{call_id}");
    assert_eq!(json["endpoints"]["tts_broadcast"], "/tts/broadcast");
}

#[tokio::test]
async fn health_reports_degraded_stages() {
    // Default config points at model files that don't exist in the test
    // environment and carries no API key.
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["services"]["stt"], false);
    assert_eq!(json["services"]["ai"], false);
    // TTS only needs a non-empty catalog.
    assert_eq!(json["services"]["tts"], true);
    assert_eq!(json["active_connections"], 0);
}

#[tokio::test]
async fn voices_returns_catalog() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(get("/voices")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 8);
    assert_eq!(json["default"], "en-GB-SoniaNeural");
    let voices = json["voices"].as_array().unwrap();
    assert_eq!(voices.len(), 8);
    assert!(voices.iter().any(|v| v["short_name"] == "ta-IN-PallaviNeural"));
}

#[tokio::test]
async fn voices_language_filter() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(get("/voices?language=hi-IN")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 2);
}

#[tokio::test]
async fn tts_voices_defaults_to_english() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(get("/tts/voices")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 4);
    let voices = json["voices"].as_array().unwrap();
    assert_eq!(voices.len(), 4);
    assert!(voices.iter().all(|v| v["locale"] == "en-GB"));
}

#[tokio::test]
async fn tts_voices_honors_language_query() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(get("/tts/voices?language=ta")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["voices"][0]["locale"], "ta-IN");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
