//! AI response generation via the Groq chat-completions API.
//!
//! Groq exposes an OpenAI-compatible `/chat/completions` endpoint. Each call
//! carries a voice-tuned system prompt plus a window of the conversation so
//! far, keyed by `call_id`. History lives in memory only and is pruned when
//! a call goes idle.

use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// System prompt shaping responses for spoken output.
const SYSTEM_PROMPT: &str = "You are a helpful voice assistant. \
Keep responses concise, natural, and conversational. \
Speak in short, clear sentences perfect for voice. \
Avoid long paragraphs or technical jargon unless asked.";

/// How many history messages are sent as context with each request.
const CONTEXT_WINDOW: usize = 10;

/// Hard cap on stored history per call (10 exchanges).
const HISTORY_CAP: usize = 20;

/// Groq API configuration.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A single chat message in OpenAI wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Result of a successful completion call.
#[derive(Debug, Clone)]
pub struct AiReply {
    pub text: String,
    pub model: String,
    pub tokens_used: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    top_p: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

struct Conversation {
    messages: Vec<ChatMessage>,
    last_activity: Instant,
}

/// Chat client with per-call conversation memory.
#[derive(Clone)]
pub struct AiService {
    config: AiConfig,
    client: reqwest::Client,
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
}

impl AiService {
    /// Builds the client. Fails when the TLS backend cannot initialize,
    /// which would otherwise surface as a panic on the first request.
    pub fn new(config: AiConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            conversations: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Whether an API key is configured. Without one every chat call fails.
    pub fn is_ready(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Builds the message list for one request: system prompt, a window of
    /// history, then the new user message.
    fn build_messages(history: &[ChatMessage], user_message: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len().min(CONTEXT_WINDOW) + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        let start = history.len().saturating_sub(CONTEXT_WINDOW);
        messages.extend_from_slice(&history[start..]);
        messages.push(ChatMessage::user(user_message));
        messages
    }

    /// Generates a response for `user_message` within the call's conversation.
    pub async fn chat(&self, user_message: &str, call_id: &str) -> Result<AiReply, VoiceError> {
        if !self.is_ready() {
            return Err(VoiceError::Config(
                "GROQ_API_KEY not configured".to_string(),
            ));
        }

        let messages = {
            let conversations = self.conversations.read().await;
            let history = conversations
                .get(call_id)
                .map(|c| c.messages.as_slice())
                .unwrap_or(&[]);
            Self::build_messages(history, user_message)
        };

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: 1,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoiceError::Timeout(format!("AI request timed out: {}", e))
                } else {
                    VoiceError::Ai(format!("AI request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("AI API returned {}: {}", status, truncate(&body, 200));
            return Err(match status.as_u16() {
                401 | 403 => VoiceError::Auth(detail),
                429 => VoiceError::RateLimit(detail),
                _ => VoiceError::Ai(detail),
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Ai(format!("malformed AI response: {}", e)))?;

        let text = completion
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VoiceError::Ai("AI response contained no choices".to_string()))?;

        self.record_exchange(call_id, user_message, &text).await;

        Ok(AiReply {
            text,
            model: self.config.model.clone(),
            tokens_used: completion.usage.map(|u| u.total_tokens),
        })
    }

    /// Appends a user/assistant exchange to the call's history, enforcing
    /// the cap.
    pub async fn record_exchange(&self, call_id: &str, user_msg: &str, ai_msg: &str) {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(call_id.to_string())
            .or_insert_with(|| Conversation {
                messages: Vec::new(),
                last_activity: Instant::now(),
            });

        conversation.messages.push(ChatMessage::user(user_msg));
        conversation.messages.push(ChatMessage::assistant(ai_msg));
        if conversation.messages.len() > HISTORY_CAP {
            let excess = conversation.messages.len() - HISTORY_CAP;
            conversation.messages.drain(..excess);
        }
        conversation.last_activity = Instant::now();
    }

    /// Clears history for one call, or for all calls when `call_id` is `None`.
    pub async fn reset_conversation(&self, call_id: Option<&str>) {
        let mut conversations = self.conversations.write().await;
        match call_id {
            Some(id) => {
                conversations.remove(id);
                tracing::info!(call_id = %id, "conversation reset");
            }
            None => {
                conversations.clear();
                tracing::info!("all conversations reset");
            }
        }
    }

    /// Number of stored history messages for a call.
    pub async fn conversation_len(&self, call_id: &str) -> usize {
        self.conversations
            .read()
            .await
            .get(call_id)
            .map(|c| c.messages.len())
            .unwrap_or(0)
    }

    /// Number of calls currently holding history.
    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Drops conversations idle for longer than `ttl`. Returns how many were
    /// removed.
    pub async fn prune_idle(&self, ttl: Duration) -> usize {
        let mut conversations = self.conversations.write().await;
        let before = conversations.len();
        conversations.retain(|_, c| c.last_activity.elapsed() <= ttl);
        before - conversations.len()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
