//! Pipeline orchestration: STT → AI → TTS.

use crate::ai::AiService;
use crate::error::VoiceError;
use crate::stt::SttService;
use crate::tts::TtsService;
use serde::Serialize;
use std::time::Instant;

/// Output of a complete pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Transcribed input text. `None` for text-input runs.
    pub transcription: Option<String>,
    pub ai_response: String,
    /// Synthesized response audio (WAV).
    pub audio_wav: Vec<u8>,
    pub total_duration: f64,
    pub stt_duration: Option<f64>,
    pub ai_duration: f64,
    pub tts_duration: f64,
    pub tokens_used: Option<u32>,
    pub language: Option<String>,
}

/// Per-stage readiness, reported by `/health`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PipelineHealth {
    pub stt: bool,
    pub ai: bool,
    pub tts: bool,
}

impl PipelineHealth {
    pub fn all_ok(&self) -> bool {
        self.stt && self.ai && self.tts
    }
}

/// The complete voice processing pipeline.
///
/// Stages fail independently; the returned [`VoiceError`]'s code names the
/// failing stage (`STT_ERROR`, `AI_ERROR`, `TTS_ERROR`).
#[derive(Clone)]
pub struct Pipeline {
    stt: SttService,
    ai: AiService,
    tts: TtsService,
}

impl Pipeline {
    pub fn new(stt: SttService, ai: AiService, tts: TtsService) -> Self {
        Self { stt, ai, tts }
    }

    pub fn ai(&self) -> &AiService {
        &self.ai
    }

    pub fn tts(&self) -> &TtsService {
        &self.tts
    }

    pub fn stt(&self) -> &SttService {
        &self.stt
    }

    /// Full pipeline: audio → text → AI → speech.
    pub async fn process_audio(
        &self,
        call_id: &str,
        audio_data: &[u8],
        language: Option<&str>,
    ) -> Result<PipelineOutput, VoiceError> {
        let start = Instant::now();

        tracing::info!(call_id = %call_id, bytes = audio_data.len(), "stage 1: STT");
        let stt_start = Instant::now();
        let transcription = self.stt.transcribe(audio_data, language).await?;
        let stt_duration = stt_start.elapsed().as_secs_f64();

        if transcription.is_empty() {
            return Err(VoiceError::Stt(
                "no speech detected in audio".to_string(),
            ));
        }
        tracing::info!(call_id = %call_id, user = %transcription, "transcribed");

        let (ai_response, ai_duration, tokens_used) =
            self.ai_stage(call_id, &transcription).await?;

        let (audio_wav, tts_duration) = self.tts_stage(call_id, &ai_response).await?;

        let total_duration = start.elapsed().as_secs_f64();
        tracing::info!(
            call_id = %call_id,
            total_duration,
            "pipeline completed"
        );

        Ok(PipelineOutput {
            transcription: Some(transcription),
            ai_response,
            audio_wav,
            total_duration,
            stt_duration: Some(stt_duration),
            ai_duration,
            tts_duration,
            tokens_used,
            language: language.map(str::to_string),
        })
    }

    /// Text pipeline: skips STT.
    pub async fn process_text(
        &self,
        call_id: &str,
        text: &str,
    ) -> Result<PipelineOutput, VoiceError> {
        let start = Instant::now();

        if text.trim().is_empty() {
            return Err(VoiceError::Ai("text must not be empty".to_string()));
        }

        tracing::info!(call_id = %call_id, text = %text, "processing text");
        let (ai_response, ai_duration, tokens_used) = self.ai_stage(call_id, text).await?;
        let (audio_wav, tts_duration) = self.tts_stage(call_id, &ai_response).await?;

        Ok(PipelineOutput {
            transcription: None,
            ai_response,
            audio_wav,
            total_duration: start.elapsed().as_secs_f64(),
            stt_duration: None,
            ai_duration,
            tts_duration,
            tokens_used,
            language: None,
        })
    }

    async fn ai_stage(
        &self,
        call_id: &str,
        user_text: &str,
    ) -> Result<(String, f64, Option<u32>), VoiceError> {
        tracing::info!(call_id = %call_id, "stage 2: AI");
        let ai_start = Instant::now();
        let reply = self.ai.chat(user_text, call_id).await?;
        tracing::info!(call_id = %call_id, response = %reply.text, "AI responded");
        Ok((
            reply.text,
            ai_start.elapsed().as_secs_f64(),
            reply.tokens_used,
        ))
    }

    async fn tts_stage(&self, call_id: &str, text: &str) -> Result<(Vec<u8>, f64), VoiceError> {
        tracing::info!(call_id = %call_id, "stage 3: TTS");
        let tts_start = Instant::now();
        let voice_id = self.tts.catalog().default_voice_id().to_string();
        let audio = self.tts.synthesize(text, &voice_id, None, None).await?;
        Ok((audio, tts_start.elapsed().as_secs_f64()))
    }

    /// Per-stage readiness checks.
    pub fn health(&self) -> PipelineHealth {
        PipelineHealth {
            stt: self.stt.is_ready(),
            ai: self.ai.is_ready(),
            tts: self.tts.is_ready(),
        }
    }
}
