//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// AI provider settings.
    #[serde(default)]
    pub ai: AiSection,

    /// Speech-to-text settings.
    #[serde(default)]
    pub stt: SttSection,

    /// Text-to-speech settings.
    #[serde(default)]
    pub tts: TtsSection,

    /// WebSocket settings.
    #[serde(default)]
    pub ws: WsSection,

    /// API-key authentication.
    #[serde(default)]
    pub auth: AuthSection,

    /// Rate limits and maintenance knobs.
    #[serde(default)]
    pub limits: LimitsSection,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Raw CORS origins: `*`, a JSON array, or a comma-separated list.
    #[serde(default = "default_cors")]
    pub cors_origins: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "chorus_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// AI provider configuration. The API key is only ever read from the
/// `GROQ_API_KEY` environment variable, never from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AiSection {
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_ai_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_ai_temperature")]
    pub temperature: f32,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub api_key: String,
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SttSection {
    /// Path to the whisper GGML model file.
    #[serde(default = "default_stt_model")]
    pub model_path: String,
    /// Path to the whisper.cpp binary.
    #[serde(default = "default_stt_binary")]
    pub binary_path: String,
    /// Default transcription language.
    #[serde(default = "default_stt_language")]
    pub language: String,
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsSection {
    /// Directory holding piper voice models.
    #[serde(default = "default_voices_dir")]
    pub voices_dir: String,
    /// Path to the piper binary. Empty uses the espeak-ng fallback.
    #[serde(default)]
    pub piper_binary: String,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WsSection {
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Outbound frame queue size per session.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

/// API-key authentication. When enabled, requests outside `/` and `/health`
/// must carry `X-API-Key` matching `api_key`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Rate limits (requests per minute, per client IP) and maintenance.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsSection {
    #[serde(default = "default_rate_limit")]
    pub default_per_minute: u32,
    #[serde(default = "default_pipeline_limit")]
    pub pipeline_per_minute: u32,
    #[serde(default = "default_broadcast_limit")]
    pub broadcast_per_minute: u32,
    /// Conversations idle for longer than this are pruned. 0 disables pruning.
    #[serde(default = "default_conversation_ttl")]
    pub conversation_ttl_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    4000
}

fn default_cors() -> String {
    "*".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ai_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_ai_max_tokens() -> u32 {
    150
}

fn default_ai_temperature() -> f32 {
    0.7
}

fn default_ai_timeout() -> u64 {
    30
}

fn default_stt_model() -> String {
    "models/ggml-distil-large-v3.bin".to_string()
}

fn default_stt_binary() -> String {
    "whisper-cli".to_string()
}

fn default_stt_language() -> String {
    "en".to_string()
}

fn default_voices_dir() -> String {
    "voices".to_string()
}

fn default_heartbeat() -> u64 {
    30
}

fn default_max_connections() -> usize {
    100
}

fn default_queue_size() -> usize {
    100
}

fn default_rate_limit() -> u32 {
    120
}

fn default_pipeline_limit() -> u32 {
    30
}

fn default_broadcast_limit() -> u32 {
    60
}

fn default_conversation_ttl() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            model: default_ai_model(),
            base_url: default_ai_base_url(),
            max_tokens: default_ai_max_tokens(),
            temperature: default_ai_temperature(),
            timeout_secs: default_ai_timeout(),
            api_key: String::new(),
        }
    }
}

impl Default for SttSection {
    fn default() -> Self {
        Self {
            model_path: default_stt_model(),
            binary_path: default_stt_binary(),
            language: default_stt_language(),
        }
    }
}

impl Default for TtsSection {
    fn default() -> Self {
        Self {
            voices_dir: default_voices_dir(),
            piper_binary: String::new(),
        }
    }
}

impl Default for WsSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat(),
            max_connections: default_max_connections(),
            queue_size: default_queue_size(),
        }
    }
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            default_per_minute: default_rate_limit(),
            pipeline_per_minute: default_pipeline_limit(),
            broadcast_per_minute: default_broadcast_limit(),
            conversation_ttl_secs: default_conversation_ttl(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Parses a raw CORS origin setting into an explicit origin list.
///
/// Returns an empty vec for "allow any" (`*`, empty, or unparseable input).
/// Accepts a JSON array first, then falls back to comma splitting.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "*" {
        return Vec::new();
    }

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(raw) {
        let origins: Vec<String> = items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
            .collect();
        if !origins.is_empty() {
            return origins;
        }
    }

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Maps the original service's log level names onto tracing filter levels.
fn normalize_log_level(level: &str) -> String {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" => "error".to_string(),
        "CRITICAL" => "error".to_string(),
        _ => level.to_string(),
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides (applied after the file):
/// - `HOST` / `PORT` override `server.host` / `server.port`
/// - `CORS_ORIGINS_RAW` overrides `server.cors_origins`
/// - `LOG_LEVEL` overrides `logging.level` (INFO/WARNING/ERROR accepted)
/// - `LOG_FORMAT` set to `json` enables JSON log output
/// - `DEBUG` set to "true"/"1" forces debug-level logging
/// - `GROQ_API_KEY` sets `ai.api_key` (the only way to set it)
/// - `AI_MODEL` overrides `ai.model`
/// - `WHISPER_MODEL` overrides `stt.model_path`
/// - `ENABLE_AUTH` / `SERVICE_API_KEY` override the auth section
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            // Silent fallback: this runs before the tracing subscriber is
            // up, so the entry point reports the missing file instead.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(raw) = std::env::var("CORS_ORIGINS_RAW") {
        config.server.cors_origins = raw;
    }
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        config.logging.level = normalize_log_level(&level);
    }
    if let Ok(format) = std::env::var("LOG_FORMAT") {
        config.logging.json = format.eq_ignore_ascii_case("json");
    }
    if let Ok(debug) = std::env::var("DEBUG") {
        if debug == "true" || debug == "1" {
            config.logging.level = "debug".to_string();
        }
    }
    if let Ok(key) = std::env::var("GROQ_API_KEY") {
        config.ai.api_key = key;
    }
    if let Ok(model) = std::env::var("AI_MODEL") {
        config.ai.model = model;
    }
    if let Ok(model) = std::env::var("WHISPER_MODEL") {
        config.stt.model_path = model;
    }
    if let Ok(enabled) = std::env::var("ENABLE_AUTH") {
        config.auth.enabled = enabled == "true" || enabled == "1";
    }
    if let Ok(key) = std::env::var("SERVICE_API_KEY") {
        config.auth.api_key = Some(key);
    }

    Ok(config)
}
