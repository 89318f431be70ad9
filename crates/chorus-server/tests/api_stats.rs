use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use chorus_server::{app, config::Config, AppState};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40005);
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
async fn stats_shape() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["service"], "chorus");
    assert_eq!(json["voices"], 8);
    assert_eq!(json["conversations"], 0);
    assert_eq!(json["pipeline"]["runs"], 0);
    assert_eq!(json["websocket"]["active_connections"], 0);
    assert!(json["websocket"]["connections"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn request_counter_increments() {
    let app = app(AppState::new(Config::default()).unwrap());

    // Two requests before reading stats: the stats request itself is counted
    // too, so the total is at least 3.
    app.clone().oneshot(get("/voices")).await.unwrap();
    app.clone().oneshot(get("/health")).await.unwrap();

    let response = app.oneshot(get("/stats")).await.unwrap();
    let json = body_json(response).await;
    assert!(json["requests"]["total"].as_u64().unwrap() >= 3);
}

#[tokio::test]
async fn failed_pipeline_requests_count_as_errors() {
    let app = app(AppState::new(Config::default()).unwrap());

    let mut request = Request::builder()
        .uri("/process-text")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"call_id":"c1","text":"hello"}"#))
        .unwrap();
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40005);
    request.extensions_mut().insert(ConnectInfo(addr));

    // Fails in the AI stage (no API key configured).
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.oneshot(get("/stats")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["requests"]["process_text"], 1);
    assert_eq!(json["requests"]["pipeline_errors"], 1);
    assert_eq!(json["pipeline"]["runs"], 0);
}
