//! Chorus server library logic.

pub mod api_pipeline;
pub mod api_stats;
pub mod api_tts;
pub mod api_ws;
pub mod background;
pub mod config;
pub mod middleware;

use api_stats::ServiceStats;
use api_ws::ConnectionManager;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Extension, Json, Router,
};
use chorus_types::VoiceCatalog;
use chorus_voice::{AiConfig, AiService, Pipeline, SttService, TtsConfig, TtsService, VoiceError};
use middleware::RateLimiter;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: config::Config,
    /// The STT → AI → TTS processing pipeline.
    pub pipeline: Pipeline,
    /// Voice catalog, shared with the TTS service.
    pub catalog: Arc<VoiceCatalog>,
    /// Rate limiter state.
    pub rate_limiter: RateLimiter,
    /// Connection manager for WebSockets.
    pub connection_manager: ConnectionManager,
    /// Service counters.
    pub stats: Arc<ServiceStats>,
}

impl AppState {
    /// Builds the shared state from configuration.
    ///
    /// Fails when the AI HTTP client cannot be constructed (TLS backend
    /// initialization).
    pub fn new(config: config::Config) -> Result<Self, VoiceError> {
        let catalog = Arc::new(VoiceCatalog::default());

        let stt = SttService::new(
            &config.stt.model_path,
            &config.stt.binary_path,
            &config.stt.language,
        );
        let ai = AiService::new(AiConfig {
            api_key: config.ai.api_key.clone(),
            base_url: config.ai.base_url.clone(),
            model: config.ai.model.clone(),
            max_tokens: config.ai.max_tokens,
            temperature: config.ai.temperature,
            timeout: Duration::from_secs(config.ai.timeout_secs),
        })?;
        let tts = TtsService::new(
            TtsConfig {
                voices_dir: config.tts.voices_dir.clone().into(),
                piper_binary: config.tts.piper_binary.clone().into(),
            },
            catalog.clone(),
        );

        let connection_manager = ConnectionManager::new(config.ws.max_connections);

        Ok(Self {
            config,
            pipeline: Pipeline::new(stt, ai, tts),
            catalog,
            rate_limiter: RateLimiter::new(),
            connection_manager,
            stats: Arc::new(ServiceStats::new()),
        })
    }
}

/// Maximum request body size for JSON endpoints (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Body limit for the pipeline endpoints: base64/hex encoding inflates a
/// 10 MiB audio cap to roughly 14 MiB on the wire.
const MAX_PIPELINE_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Service banner handler.
async fn root(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "service": "chorus",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "model": state.pipeline.ai().model(),
        "endpoints": {
            "health": "/health",
            "process_audio": "/process-audio",
            "process_text": "/process-text",
            "voices": "/voices",
            "stats": "/stats",
            "websocket": "/ws/{call_id}",
            "tts_broadcast": "/tts/broadcast",
            "tts_voices": "/tts/voices",
        },
    }))
}

/// Health check handler.
///
/// Reports per-stage readiness. The service stays `200 OK` even when a stage
/// is degraded; load balancers keep routing and the body tells operators
/// which stage to fix.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let stages = state.pipeline.health();
    Json(json!({
        "status": if stages.all_ok() { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
        "services": {
            "stt": stages.stt,
            "ai": stages.ai,
            "tts": stages.tts,
        },
        "active_connections": state.connection_manager.active_count().await,
    }))
}

/// Builds the CORS layer from the raw origins setting.
fn cors_layer(raw_origins: &str) -> CorsLayer {
    let origins = config::parse_cors_origins(raw_origins);
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(values))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // Pipeline routes carry encoded audio and need a larger body limit than
    // the rest of the API.
    let pipeline_routes = Router::new()
        .route("/process-audio", post(api_pipeline::process_audio_handler))
        .route("/process-text", post(api_pipeline::process_text_handler))
        .layer(DefaultBodyLimit::max(MAX_PIPELINE_BODY_BYTES));

    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/voices", get(api_tts::voices_handler))
        .route("/stats", get(api_stats::stats_handler))
        .route("/tts/broadcast", post(api_tts::broadcast_handler))
        .route("/tts/voices", get(api_tts::tts_voices_handler))
        .merge(pipeline_routes)
        .route("/ws/{call_id}", get(api_ws::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(axum::middleware::from_fn(middleware::auth_middleware))
        .layer(axum::middleware::from_fn(api_stats::count_requests))
        .layer(axum::middleware::from_fn(middleware::rate_limit_middleware))
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}
