use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use chorus_server::{app, config::Config, AppState};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower::ServiceExt;

fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40002);
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn auth_enabled_config(key: &str) -> Config {
    let mut config = Config::default();
    config.auth.enabled = true;
    config.auth.api_key = Some(key.to_string());
    config
}

#[tokio::test]
async fn auth_disabled_passes_everything() {
    let app = app(AppState::new(Config::default()).unwrap());

    let response = app.oneshot(get("/voices", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_key_is_rejected() {
    let app = app(AppState::new(auth_enabled_config("secret-key")).unwrap());

    let response = app.oneshot(get("/voices", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_key_is_rejected() {
    let app = app(AppState::new(auth_enabled_config("secret-key")).unwrap());

    let response = app.oneshot(get("/voices", Some("wrong"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn correct_key_is_accepted() {
    let app = app(AppState::new(auth_enabled_config("secret-key")).unwrap());

    let response = app
        .oneshot(get("/voices", Some("secret-key")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn public_paths_skip_auth() {
    let app = app(AppState::new(auth_enabled_config("secret-key")).unwrap());

    let response = app.clone().oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn enabled_auth_without_configured_key_rejects_all() {
    let mut config = Config::default();
    config.auth.enabled = true;
    config.auth.api_key = None;
    let app = app(AppState::new(config).unwrap());

    let response = app.oneshot(get("/voices", Some("anything"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
