//! TTS API handlers: voice listings and broadcast synthesis.

use crate::api_pipeline::ApiError;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use chorus_types::voice::VoiceListing;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Maximum text length for a broadcast announcement.
const MAX_BROADCAST_TEXT_LEN: usize = 1000;

/// Query parameters for the voice listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct VoiceListParams {
    /// Optional language filter (`en-GB`, or a bare prefix like `en`).
    pub language: Option<String>,
}

/// Request body for `POST /tts/broadcast`.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub text: String,
    /// Catalog voice ID. Defaults to the service default voice.
    #[serde(default)]
    pub voice: Option<String>,
    /// Synthesis backend. Only `local` is supported.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Percent rate adjustment, e.g. `"+10%"`.
    #[serde(default)]
    pub rate: Option<String>,
    /// Percent volume adjustment, e.g. `"-20%"`.
    #[serde(default)]
    pub volume: Option<String>,
}

fn default_provider() -> String {
    "local".to_string()
}

fn filtered_listing(state: &AppState, params: &VoiceListParams) -> Vec<VoiceListing> {
    match params.language.as_deref() {
        Some(lang) if !lang.is_empty() => state.catalog.listing_for_language(lang),
        _ => state.catalog.listing(),
    }
}

/// Handler for `GET /voices`.
pub async fn voices_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<VoiceListParams>,
) -> Json<serde_json::Value> {
    let voices = filtered_listing(&state, &params);
    Json(json!({
        "voices": voices,
        "count": voices.len(),
        "default": state.catalog.default_voice_id(),
    }))
}

/// Handler for `GET /tts/voices`. Same catalog as `/voices`, but the
/// language filter defaults to `en` for broadcast tooling.
pub async fn tts_voices_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<VoiceListParams>,
) -> Json<serde_json::Value> {
    let language = params.language.as_deref().unwrap_or("en");
    let voices = if language.is_empty() {
        state.catalog.listing()
    } else {
        state.catalog.listing_for_language(language)
    };
    Json(json!({
        "voices": voices,
        "count": voices.len(),
    }))
}

/// Handler for `POST /tts/broadcast`.
///
/// Synthesizes an announcement and returns it as a downloadable WAV file.
/// The response is cacheable: identical announcements are expected to be
/// replayed by the caller, not re-synthesized.
pub async fn broadcast_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<BroadcastRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".into()));
    }
    if text.len() > MAX_BROADCAST_TEXT_LEN {
        return Err(ApiError::BadRequest(format!(
            "text exceeds maximum length of {} characters",
            MAX_BROADCAST_TEXT_LEN
        )));
    }
    if !payload.provider.eq_ignore_ascii_case("local") {
        return Err(ApiError::BadRequest(format!(
            "Unsupported TTS provider: {}",
            payload.provider
        )));
    }

    let voice_id = payload
        .voice
        .as_deref()
        .unwrap_or_else(|| state.catalog.default_voice_id());
    if !state.catalog.is_allowed(voice_id) {
        return Err(ApiError::BadRequest(state.catalog.validation_error()));
    }

    state.stats.broadcast_requests.fetch_add(1, Ordering::Relaxed);

    let audio = state
        .pipeline
        .tts()
        .synthesize(
            text,
            voice_id,
            payload.rate.as_deref(),
            payload.volume.as_deref(),
        )
        .await
        .inspect_err(|e| {
            tracing::warn!(voice = %voice_id, code = e.code(), "broadcast synthesis failed: {}", e);
        })?;

    tracing::info!(
        voice = %voice_id,
        bytes = audio.len(),
        chars = text.len(),
        "broadcast synthesized"
    );

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=broadcast.wav"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );

    Ok((StatusCode::OK, headers, audio))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_request_defaults() {
        let req: BroadcastRequest =
            serde_json::from_str(r#"{"text":"now boarding"}"#).unwrap();
        assert_eq!(req.provider, "local");
        assert!(req.voice.is_none());
        assert!(req.rate.is_none());
    }

    #[test]
    fn broadcast_request_full() {
        let req: BroadcastRequest = serde_json::from_str(
            r#"{"text":"hi","voice":"ta-IN-PallaviNeural","provider":"local","rate":"+10%","volume":"-5%"}"#,
        )
        .unwrap();
        assert_eq!(req.voice.as_deref(), Some("ta-IN-PallaviNeural"));
        assert_eq!(req.rate.as_deref(), Some("+10%"));
    }
}
