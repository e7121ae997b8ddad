use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// One role-tagged message in a chat request
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// A chat completion request. Every field takes part in the cache fingerprint,
/// so anything that can change the answer belongs in here (`options` for the rest).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub max_tokens: u32,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            seed: None,
            max_tokens: 0,
            options: BTreeMap::new(),
        }
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

// Ollama /api/chat request format
#[derive(Serialize)]
pub struct OllamaChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    pub options: serde_json::Map<String, serde_json::Value>,
}

// Ollama /api/chat response format (non streaming)
#[derive(Deserialize)]
pub struct OllamaChatResponse {
    pub message: ChatMessage,
}
