use crate::audio;
use crate::error::VoiceError;
use chorus_types::voice::{VoiceCatalog, VoiceInfo};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for TTS process execution.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Output sample rate of the piper voices shipped in the catalog.
const PIPER_SAMPLE_RATE: u32 = 22050;

/// Output sample rate of espeak-ng WAV output.
const ESPEAK_SAMPLE_RATE: u32 = 22050;

/// TTS engine configuration.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Directory holding the piper voice models.
    pub voices_dir: PathBuf,
    /// Path to the piper binary. Empty disables piper and uses espeak-ng.
    pub piper_binary: PathBuf,
}

/// Service for generating speech from text.
///
/// Synthesis goes through piper when a binary is configured, falling back to
/// `espeak-ng` otherwise. Either way the result is a WAV container around
/// mono s16le PCM.
#[derive(Debug, Clone)]
pub struct TtsService {
    config: TtsConfig,
    catalog: Arc<VoiceCatalog>,
}

impl TtsService {
    pub fn new(config: TtsConfig, catalog: Arc<VoiceCatalog>) -> Self {
        Self { config, catalog }
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Whether the service can synthesize at all.
    pub fn is_ready(&self) -> bool {
        !self.catalog.is_empty()
    }

    fn use_piper(&self) -> bool {
        !self.config.piper_binary.as_os_str().is_empty() && self.config.piper_binary.exists()
    }

    /// Synthesizes speech for a catalog voice.
    ///
    /// `rate` and `volume` are edge-tts style percent adjustments
    /// (`"+0%"`, `"-50%"`); `None` leaves them unchanged. Returns WAV bytes.
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        rate: Option<&str>,
        volume: Option<&str>,
    ) -> Result<Vec<u8>, VoiceError> {
        if text.is_empty() {
            return Err(VoiceError::Tts("text must not be empty".to_string()));
        }
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let voice = self
            .catalog
            .get(voice_id)
            .ok_or_else(|| VoiceError::Tts(self.catalog.validation_error()))?;

        let speed = voice.speed * rate.map(audio::parse_percent).transpose()?.unwrap_or(1.0);
        if !(0.1..=10.0).contains(&speed) {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        let (mut pcm, sample_rate) = if self.use_piper() {
            (self.synthesize_piper(text, voice, speed).await?, PIPER_SAMPLE_RATE)
        } else {
            (
                self.synthesize_espeak(text, voice, speed).await?,
                ESPEAK_SAMPLE_RATE,
            )
        };

        if let Some(vol) = volume {
            audio::apply_gain(&mut pcm, audio::parse_percent(vol)?);
        }

        Ok(audio::wrap_pcm_bytes(&pcm, sample_rate))
    }

    async fn synthesize_piper(
        &self,
        text: &str,
        voice: &VoiceInfo,
        speed: f32,
    ) -> Result<Vec<u8>, VoiceError> {
        let model_path = if Path::new(&voice.model_path).is_absolute() {
            PathBuf::from(&voice.model_path)
        } else {
            self.config.voices_dir.join(&voice.model_path)
        };

        if !model_path.exists() {
            return Err(VoiceError::Tts(format!(
                "Model file not found: {:?}",
                model_path
            )));
        }

        let mut command = Command::new(&self.config.piper_binary);
        command
            .arg("--model")
            .arg(model_path)
            .arg("--output_raw")
            // Length scale is inverse of speed (roughly).
            // If speed is 2.0 (faster), length_scale should be 0.5 (shorter).
            .arg("--length_scale")
            .arg((1.0 / speed).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(speaker) = voice.speaker_id {
            command.arg("--speaker").arg(speaker.to_string());
        }

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn piper: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Tts("Failed to open stdin".to_string()))?;
        let text_owned = text.to_string();

        // Spawn a task to write to stdin to avoid deadlock if output buffer fills up
        let write_task = tokio::spawn(async move { stdin.write_all(text_owned.as_bytes()).await });

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Timeout(format!(
                    "TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to wait for piper: {}", e)))?;

        match write_task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Tts(format!(
                    "Failed to write to piper stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(VoiceError::Tts(format!("Stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Tts(format!("Piper failed: {}", stderr)));
        }

        Ok(output.stdout)
    }

    /// Fallback synthesis via `espeak-ng`.
    ///
    /// espeak-ng outputs WAV to stdout via `--stdout`; the 44-byte WAV header
    /// is stripped to return raw PCM, keeping both engines on the same
    /// output contract.
    async fn synthesize_espeak(
        &self,
        text: &str,
        voice: &VoiceInfo,
        speed: f32,
    ) -> Result<Vec<u8>, VoiceError> {
        // espeak speaks ~175 words per minute at default speed.
        let wpm = ((175.0 * speed) as u32).clamp(80, 450);

        let mut command = Command::new("espeak-ng");
        command
            .arg("--stdout")
            .arg("-v")
            .arg(voice.locale.to_lowercase())
            .arg("-s")
            .arg(wpm.to_string())
            .arg(text)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn espeak-ng: {}", e)))?;

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Timeout(format!(
                    "TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to wait for espeak-ng: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Tts(format!("espeak-ng failed: {}", stderr)));
        }

        // Strip the 44-byte WAV header to return raw PCM data.
        let wav_data = output.stdout;
        if wav_data.len() > 44 {
            Ok(wav_data[44..].to_vec())
        } else {
            Ok(wav_data)
        }
    }
}
