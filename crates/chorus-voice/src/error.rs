use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("AI error: {0}")]
    Ai(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request timed out: {0}")]
    Timeout(String),
}

impl VoiceError {
    /// Stable machine-readable code carried in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Stt(_) => "STT_ERROR",
            Self::Ai(_) => "AI_ERROR",
            Self::Tts(_) => "TTS_ERROR",
            Self::Audio(_) => "AUDIO_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::RateLimit(_) => "RATE_LIMIT",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Timeout(_) => "TIMEOUT",
        }
    }
}
