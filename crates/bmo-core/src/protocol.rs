//! Request and response shapes for the routing layer.

use serde::{Deserialize, Serialize};

use bmo_local_ai::GenerationParams;

use crate::error::ChatError;
use crate::mood::Mood;
use crate::service::ChatReply;

pub const MAX_TOKENS_RANGE: (u32, u32) = (1, 500);
pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 1.5);

fn default_max_tokens() -> u32 {
    150
}

fn default_temperature() -> f32 {
    0.8
}

/// A chat turn as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub reset_conversation: bool,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            reset_conversation: false,
        }
    }

    /// Check bounds and produce sampling parameters.
    pub fn validate(&self) -> Result<GenerationParams, ChatError> {
        if self.prompt.trim().is_empty() {
            return Err(ChatError::InvalidRequest("prompt must not be empty".to_string()));
        }

        let (min_tokens, max_tokens) = MAX_TOKENS_RANGE;
        if !(min_tokens..=max_tokens).contains(&self.max_tokens) {
            return Err(ChatError::InvalidRequest(format!(
                "max_tokens must be between {} and {}, got {}",
                min_tokens, max_tokens, self.max_tokens
            )));
        }

        let (min_temp, max_temp) = TEMPERATURE_RANGE;
        if !(min_temp..=max_temp).contains(&self.temperature) {
            return Err(ChatError::InvalidRequest(format!(
                "temperature must be between {} and {}, got {}",
                min_temp, max_temp, self.temperature
            )));
        }

        Ok(GenerationParams::default()
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature))
    }
}

/// Reply to a chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub tokens_used: Option<u32>,
    pub conversation_length: Option<usize>,
    pub mood: Mood,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            response: reply.response,
            tokens_used: Some(reply.tokens_used),
            conversation_length: Some(reply.conversation_length),
            mood: reply.mood,
        }
    }
}

/// Reply to a successful reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetReply {
    pub message: String,
    pub mood: Mood,
}

impl Default for ResetReply {
    fn default() -> Self {
        Self {
            message: "BMO's memory has been refreshed! Ready for new adventures!".to_string(),
            mood: Mood::default(),
        }
    }
}
