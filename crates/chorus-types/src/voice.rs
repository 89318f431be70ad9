//! Voice catalog definitions.
//!
//! The catalog is the single source of truth for which voices the service
//! will synthesize with. Every entry maps a public voice ID to the local
//! synthesis parameters (model file, speaker, speed) used by the TTS engine.

use serde::{Deserialize, Serialize};

/// Voice gender as exposed in the public listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceGender {
    Female,
    Male,
}

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Public voice identifier, e.g. `en-GB-SoniaNeural`.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub gender: VoiceGender,
    /// BCP-47 locale tag, e.g. `en-GB`.
    pub locale: String,
    /// Model file for the piper engine (relative to the voices directory).
    pub model_path: String,
    /// Speaker ID within a multi-speaker model (0-indexed).
    pub speaker_id: Option<u32>,
    /// Speech speed multiplier (1.0 is normal).
    pub speed: f32,
}

/// One row of the `GET /voices` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceListing {
    pub name: String,
    pub short_name: String,
    pub gender: VoiceGender,
    pub locale: String,
}

impl From<&VoiceInfo> for VoiceListing {
    fn from(v: &VoiceInfo) -> Self {
        Self {
            name: v.name.clone(),
            short_name: v.id.clone(),
            gender: v.gender,
            locale: v.locale.clone(),
        }
    }
}

/// The set of voices the service will accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceCatalog {
    voices: Vec<VoiceInfo>,
    default_voice: String,
}

/// Languages the catalog covers.
pub const ALLOWED_LANGUAGES: [&str; 3] = ["en-GB", "ta-IN", "hi-IN"];

fn entry(
    id: &str,
    name: &str,
    gender: VoiceGender,
    locale: &str,
    model_path: &str,
    speaker_id: Option<u32>,
) -> VoiceInfo {
    VoiceInfo {
        id: id.to_string(),
        name: name.to_string(),
        gender,
        locale: locale.to_string(),
        model_path: model_path.to_string(),
        speaker_id,
        speed: 1.0,
    }
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        use VoiceGender::{Female, Male};
        Self {
            voices: vec![
                entry(
                    "en-GB-SoniaNeural",
                    "English (GB) – Female",
                    Female,
                    "en-GB",
                    "en_GB-southern_english_female-medium.onnx",
                    None,
                ),
                entry(
                    "en-GB-RyanNeural",
                    "English (GB) – Male",
                    Male,
                    "en-GB",
                    "en_GB-alan-medium.onnx",
                    None,
                ),
                entry(
                    "en-GB-LibbyNeural",
                    "English (GB) – Female",
                    Female,
                    "en-GB",
                    "en_GB-vctk-medium.onnx",
                    Some(0),
                ),
                entry(
                    "en-GB-ThomasNeural",
                    "English (GB) – Male",
                    Male,
                    "en-GB",
                    "en_GB-vctk-medium.onnx",
                    Some(1),
                ),
                entry(
                    "ta-IN-PallaviNeural",
                    "Tamil – Female",
                    Female,
                    "ta-IN",
                    "ta_IN-female-medium.onnx",
                    None,
                ),
                entry(
                    "ta-IN-ValluvarNeural",
                    "Tamil – Male",
                    Male,
                    "ta-IN",
                    "ta_IN-male-medium.onnx",
                    None,
                ),
                entry(
                    "hi-IN-SwaraNeural",
                    "Hindi – Female",
                    Female,
                    "hi-IN",
                    "hi_IN-female-medium.onnx",
                    None,
                ),
                entry(
                    "hi-IN-MadhurNeural",
                    "Hindi – Male",
                    Male,
                    "hi-IN",
                    "hi_IN-male-medium.onnx",
                    None,
                ),
            ],
            default_voice: "en-GB-SoniaNeural".to_string(),
        }
    }
}

impl VoiceCatalog {
    /// Returns the catalog entry for a voice ID, if allowed.
    pub fn get(&self, voice_id: &str) -> Option<&VoiceInfo> {
        self.voices.iter().find(|v| v.id == voice_id)
    }

    /// Returns `true` if the voice ID is in the catalog.
    pub fn is_allowed(&self, voice_id: &str) -> bool {
        self.get(voice_id).is_some()
    }

    /// Returns `true` if the language tag is covered by the catalog.
    pub fn is_allowed_language(&self, language: &str) -> bool {
        ALLOWED_LANGUAGES.contains(&language)
    }

    /// The default voice entry.
    ///
    /// The default ID is validated at construction, so this never fails for
    /// a catalog built through [`VoiceCatalog::default`].
    pub fn default_voice(&self) -> &VoiceInfo {
        self.get(&self.default_voice)
            .unwrap_or(&self.voices[0])
    }

    pub fn default_voice_id(&self) -> &str {
        &self.default_voice
    }

    /// All entries.
    pub fn voices(&self) -> &[VoiceInfo] {
        &self.voices
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Formatted listing for API responses.
    pub fn listing(&self) -> Vec<VoiceListing> {
        self.voices.iter().map(VoiceListing::from).collect()
    }

    /// Entries whose locale starts with the given language prefix.
    ///
    /// A bare prefix works too: `"en"` matches `en-GB`.
    pub fn listing_for_language(&self, language: &str) -> Vec<VoiceListing> {
        self.voices
            .iter()
            .filter(|v| v.locale.starts_with(language))
            .map(VoiceListing::from)
            .collect()
    }

    /// Error message naming the allowed set, for rejection responses.
    pub fn validation_error(&self) -> String {
        let mut ids: Vec<&str> = self.voices.iter().map(|v| v.id.as_str()).collect();
        ids.sort_unstable();
        format!("Voice must be one of: {}", ids.join(", "))
    }
}
