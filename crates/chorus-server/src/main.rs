//! Chorus server binary — the main entry point for the voice pipeline service.
//!
//! Starts an axum HTTP server with structured logging, the STT/AI/TTS
//! pipeline, and graceful shutdown on SIGTERM/SIGINT.

use chorus_server::{app, background, config, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("CHORUS_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // load_config runs before the subscriber exists, so the fallback note
    // is emitted here instead.
    if let Some(path) = selected_config_path {
        if !std::path::Path::new(path).exists() {
            tracing::info!(path, "config file not found, using defaults");
        }
    }

    if config.ai.api_key.is_empty() {
        tracing::warn!(
            "GROQ_API_KEY not set — AI responses will fail until it is configured"
        );
    }
    if config.auth.enabled && config.auth.api_key.as_deref().unwrap_or("").is_empty() {
        tracing::warn!(
            "ENABLE_AUTH is on but SERVICE_API_KEY is empty — all protected requests will be rejected"
        );
    }

    let conversation_ttl = config.limits.conversation_ttl_secs;
    let addr = SocketAddr::new(config.server.host, config.server.port);

    let state = AppState::new(config)
        .expect("failed to initialize pipeline services — TLS backend unavailable");
    let stages = state.pipeline.health();
    tracing::info!(
        stt_ready = stages.stt,
        ai_ready = stages.ai,
        tts_ready = stages.tts,
        voices = state.catalog.len(),
        "pipeline initialized"
    );

    // The pruning task needs the same state the handlers see.
    let shared = Arc::new(state.clone());
    tokio::spawn(background::start_pruning_task(shared, conversation_ttl));

    let app = app(state);

    tracing::info!(%addr, "starting chorus server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // ConnectInfo is required by the rate limiter to key on client IPs.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    tracing::info!("chorus server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
