//! Pipeline API handlers: `POST /process-audio` and `POST /process-text`.

use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine;
use chorus_types::pipeline::{
    AudioProcessRequest, ErrorBody, PipelineBreakdown, PipelineResponse, TextProcessRequest,
};
use chorus_voice::{PipelineOutput, VoiceError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;

/// Maximum decoded audio payload accepted from clients (10 MiB).
pub const MAX_AUDIO_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// API error type mapping to HTTP status codes.
///
/// Every response body carries the stable error code so clients can branch
/// without parsing messages.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Pipeline(#[from] VoiceError),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Pipeline(e) => {
                let status = match &e {
                    // Client handed us audio we could not decode.
                    VoiceError::Audio(_) => StatusCode::BAD_REQUEST,
                    // Service-side misconfiguration (e.g. missing API key).
                    VoiceError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
                    VoiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    VoiceError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
                    // A pipeline engine failed at runtime.
                    VoiceError::Stt(_)
                    | VoiceError::Ai(_)
                    | VoiceError::Tts(_)
                    | VoiceError::Auth(_) => StatusCode::BAD_GATEWAY,
                };
                (status, e.code(), e.to_string())
            }
            ApiError::InternalServerError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        (status, Json(ErrorBody::new(message, code))).into_response()
    }
}

/// Decodes a client audio payload: base64 (standard alphabet) first, hex as
/// the fallback.
pub fn decode_audio_payload(data: &str) -> Result<Vec<u8>, ApiError> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("audio_data must not be empty".into()));
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .or_else(|_| hex::decode(trimmed))
        .map_err(|_| {
            ApiError::BadRequest("audio_data is neither valid base64 nor hex".to_string())
        })?;

    if decoded.len() > MAX_AUDIO_PAYLOAD_BYTES {
        return Err(ApiError::BadRequest(format!(
            "audio payload exceeds maximum size of {} bytes",
            MAX_AUDIO_PAYLOAD_BYTES
        )));
    }

    Ok(decoded)
}

/// Builds the public response from a pipeline run. Audio goes out hex-encoded
/// in a WAV container.
pub(crate) fn pipeline_response(call_id: &str, output: PipelineOutput) -> PipelineResponse {
    PipelineResponse {
        success: true,
        call_id: call_id.to_string(),
        transcription: output.transcription,
        ai_response: output.ai_response,
        audio_data: hex::encode(&output.audio_wav),
        audio_format: "wav".to_string(),
        total_duration: output.total_duration,
        breakdown: PipelineBreakdown {
            stt_duration: output.stt_duration,
            ai_duration: output.ai_duration,
            tts_duration: output.tts_duration,
        },
        tokens_used: output.tokens_used,
        language: output.language,
    }
}

fn validate_call_id(call_id: &str) -> Result<(), ApiError> {
    if call_id.trim().is_empty() {
        return Err(ApiError::BadRequest("call_id must not be empty".into()));
    }
    if call_id.len() > 128 {
        return Err(ApiError::BadRequest(
            "call_id exceeds maximum length of 128".into(),
        ));
    }
    Ok(())
}

/// Handler for `POST /process-audio`.
pub async fn process_audio_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<AudioProcessRequest>,
) -> Result<Json<PipelineResponse>, ApiError> {
    validate_call_id(&payload.call_id)?;

    if !payload.format.eq_ignore_ascii_case("wav") {
        return Err(ApiError::BadRequest(format!(
            "unsupported audio format: {} (only wav is accepted)",
            payload.format
        )));
    }

    let audio = decode_audio_payload(&payload.audio_data)?;
    state.stats.audio_requests.fetch_add(1, Ordering::Relaxed);

    let output = state
        .pipeline
        .process_audio(&payload.call_id, &audio, payload.language.as_deref())
        .await
        .inspect_err(|e| {
            state.stats.pipeline_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(call_id = %payload.call_id, code = e.code(), "audio pipeline failed: {}", e);
        })?;

    state.stats.record_pipeline(&output);
    Ok(Json(pipeline_response(&payload.call_id, output)))
}

/// Handler for `POST /process-text`.
pub async fn process_text_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<TextProcessRequest>,
) -> Result<Json<PipelineResponse>, ApiError> {
    validate_call_id(&payload.call_id)?;

    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".into()));
    }

    state.stats.text_requests.fetch_add(1, Ordering::Relaxed);

    let output = state
        .pipeline
        .process_text(&payload.call_id, &payload.text)
        .await
        .inspect_err(|e| {
            state.stats.pipeline_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(call_id = %payload.call_id, code = e.code(), "text pipeline failed: {}", e);
        })?;

    state.stats.record_pipeline(&output);
    Ok(Json(pipeline_response(&payload.call_id, output)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepts_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"RIFF data");
        assert_eq!(decode_audio_payload(&encoded).unwrap(), b"RIFF data");
    }

    #[test]
    fn decode_falls_back_to_hex() {
        // Odd-length strings can't be base64-decoded into the same bytes,
        // so use a clean hex payload.
        let hex_payload = hex::encode(b"\x01\x02\xff");
        assert_eq!(decode_audio_payload(&hex_payload).unwrap().len(), 3);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_audio_payload("!!not-encoded!!").is_err());
        assert!(decode_audio_payload("").is_err());
    }

    #[test]
    fn call_id_validation() {
        assert!(validate_call_id("call-123").is_ok());
        assert!(validate_call_id("  ").is_err());
        assert!(validate_call_id(&"x".repeat(129)).is_err());
    }
}
