//! REST request/response schemas for the processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for `POST /process-audio`.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioProcessRequest {
    /// Unique call identifier.
    pub call_id: String,
    /// Base64 or hex encoded audio (WAV container).
    pub audio_data: String,
    /// Audio container format. Only `wav` is accepted.
    #[serde(default = "default_format")]
    pub format: String,
    /// Language code for transcription.
    #[serde(default)]
    pub language: Option<String>,
}

fn default_format() -> String {
    "wav".to_string()
}

/// Request body for `POST /process-text`.
#[derive(Debug, Clone, Deserialize)]
pub struct TextProcessRequest {
    pub call_id: String,
    pub text: String,
}

/// Per-stage duration breakdown, in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineBreakdown {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt_duration: Option<f64>,
    pub ai_duration: f64,
    pub tts_duration: f64,
}

/// Successful pipeline response.
///
/// `transcription` is absent for text-input runs (no STT stage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub success: bool,
    pub call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    pub ai_response: String,
    /// Hex-encoded synthesized audio.
    pub audio_data: String,
    pub audio_format: String,
    pub total_duration: f64,
    pub breakdown: PipelineBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Error body carried by failed HTTP responses and WS error frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    /// Stable machine-readable code, e.g. `STT_ERROR`.
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_request_defaults() {
        let req: AudioProcessRequest = serde_json::from_str(
            r#"{"call_id":"c1","audio_data":"deadbeef"}"#,
        )
        .unwrap();
        assert_eq!(req.format, "wav");
        assert!(req.language.is_none());
    }

    #[test]
    fn error_body_shape() {
        let body = ErrorBody::new("boom", "TTS_ERROR");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "TTS_ERROR");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn breakdown_omits_absent_stt() {
        let b = PipelineBreakdown {
            stt_duration: None,
            ai_duration: 0.5,
            tts_duration: 0.2,
        };
        let json = serde_json::to_value(&b).unwrap();
        assert!(json.get("stt_duration").is_none());
    }
}
