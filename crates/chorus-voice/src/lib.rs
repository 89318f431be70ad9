//! Voice processing pipeline for the chorus service.
//!
//! Three stages, run in order by [`Pipeline`]:
//!
//! 1. **STT** — transcription of WAV audio via a whisper.cpp subprocess.
//! 2. **AI** — response generation through the Groq chat-completions API,
//!    with per-call conversation memory.
//! 3. **TTS** — local synthesis via a piper subprocess (espeak-ng fallback),
//!    returning PCM that is wrapped in a WAV container.
//!
//! The stages are independently constructible so the broadcast TTS surface
//! can drive [`TtsService`] directly without paying for STT or AI.

pub mod ai;
pub mod audio;
pub mod error;
pub mod pipeline;
pub mod stt;
pub mod tts;

pub use ai::{AiConfig, AiReply, AiService, ChatMessage};
pub use error::VoiceError;
pub use pipeline::{Pipeline, PipelineHealth, PipelineOutput};
pub use stt::SttService;
pub use tts::{TtsConfig, TtsService};
