//! WAV container helpers.
//!
//! The STT stage accepts WAV input from clients and the TTS engines emit raw
//! PCM (s16le), so both directions of container handling live here. Only
//! 16-bit PCM is supported; anything else is rejected up front rather than
//! being piped into a transcription subprocess that would fail obscurely.

use crate::error::VoiceError;

/// Format parameters read from a WAV `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

const RIFF_HEADER_LEN: usize = 12;

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Parses a WAV file and returns its format plus mono 16-bit samples.
///
/// Multi-channel input is mixed down to mono by averaging, matching what the
/// transcription model expects. Returns [`VoiceError::Audio`] for anything
/// that is not a 16-bit PCM RIFF/WAVE file.
pub fn parse_wav(bytes: &[u8]) -> Result<(WavSpec, Vec<i16>), VoiceError> {
    if bytes.len() < RIFF_HEADER_LEN
        || &bytes[0..4] != b"RIFF"
        || &bytes[8..12] != b"WAVE"
    {
        return Err(VoiceError::Audio("not a RIFF/WAVE file".to_string()));
    }

    let mut spec: Option<WavSpec> = None;
    let mut data: Option<&[u8]> = None;

    // Walk the chunk list. Chunks are word-aligned; odd-sized chunks carry a
    // pad byte that is not counted in the chunk size.
    let mut pos = RIFF_HEADER_LEN;
    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_len = read_u32(bytes, pos + 4) as usize;
        let body_start = pos + 8;
        let body_end = body_start.checked_add(chunk_len).filter(|&e| e <= bytes.len());

        match (chunk_id, body_end) {
            (b"fmt ", Some(_)) if chunk_len >= 16 => {
                let audio_format = read_u16(bytes, body_start);
                if audio_format != 1 {
                    return Err(VoiceError::Audio(format!(
                        "unsupported WAV encoding {} (only PCM is accepted)",
                        audio_format
                    )));
                }
                let channels = read_u16(bytes, body_start + 2);
                if channels == 0 {
                    return Err(VoiceError::Audio("WAV declares zero channels".to_string()));
                }
                spec = Some(WavSpec {
                    channels,
                    sample_rate: read_u32(bytes, body_start + 4),
                    bits_per_sample: read_u16(bytes, body_start + 14),
                });
            }
            (b"data", Some(end)) => {
                data = Some(&bytes[body_start..end]);
            }
            (_, Some(_)) => {} // skip unknown chunks (LIST, fact, ...)
            (_, None) => {
                return Err(VoiceError::Audio("truncated WAV chunk".to_string()));
            }
        }

        pos = body_start + chunk_len + (chunk_len & 1);
    }

    let spec = spec.ok_or_else(|| VoiceError::Audio("missing fmt chunk".to_string()))?;
    let data = data.ok_or_else(|| VoiceError::Audio("missing data chunk".to_string()))?;

    if spec.bits_per_sample != 16 {
        return Err(VoiceError::Audio(format!(
            "unsupported bit depth {} (only 16-bit PCM is accepted)",
            spec.bits_per_sample
        )));
    }

    let frame_bytes = 2 * spec.channels as usize;
    let frames = data.len() / frame_bytes;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let base = frame * frame_bytes;
        let mut acc: i32 = 0;
        for ch in 0..spec.channels as usize {
            acc += i16::from_le_bytes([data[base + 2 * ch], data[base + 2 * ch + 1]]) as i32;
        }
        mono.push((acc / spec.channels as i32) as i16);
    }

    Ok((spec, mono))
}

/// Wraps mono 16-bit PCM samples in a minimal WAV container.
pub fn write_wav(pcm: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_len = (pcm.len() * 2) as u32;
    let byte_rate = sample_rate * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in pcm {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Wraps raw s16le bytes (as emitted by the TTS engines) in a WAV container.
pub fn wrap_pcm_bytes(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    write_wav(&samples, sample_rate)
}

/// Parses an edge-tts style percent adjustment (`"+0%"`, `"-50%"`, `"+25%"`)
/// into a multiplier. `"+0%"` is 1.0.
pub fn parse_percent(value: &str) -> Result<f32, VoiceError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_suffix('%')
        .ok_or_else(|| VoiceError::Audio(format!("invalid percent value: {}", value)))?;
    let pct: f32 = digits
        .parse()
        .map_err(|_| VoiceError::Audio(format!("invalid percent value: {}", value)))?;
    let factor = 1.0 + pct / 100.0;
    if !(0.1..=3.0).contains(&factor) {
        return Err(VoiceError::Audio(format!(
            "percent adjustment out of range: {}",
            value
        )));
    }
    Ok(factor)
}

/// Applies a linear gain to s16le PCM bytes, saturating at the sample bounds.
pub fn apply_gain(pcm: &mut [u8], factor: f32) {
    if (factor - 1.0).abs() < f32::EPSILON {
        return;
    }
    for chunk in pcm.chunks_exact_mut(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        let scaled = (sample as f32 * factor)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        chunk.copy_from_slice(&scaled.to_le_bytes());
    }
}
