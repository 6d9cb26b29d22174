//! Sampling parameters for a single completion call.

use serde::{Deserialize, Serialize};

/// Stop sequences that end a turn before the model starts speaking for the user.
pub const DEFAULT_STOP_SEQUENCES: &[&str] = &[
    "Human:",
    "User:",
    "[INST]",
    "</s>",
    "\n\nHuman:",
    "\n\nUser:",
    "Assistant:",
];

/// Per-request generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 150,
            temperature: 0.8,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            stop_sequences: DEFAULT_STOP_SEQUENCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl GenerationParams {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stop_sequences<I, S>(mut self, stops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_sequences = stops.into_iter().map(Into::into).collect();
        self
    }

    /// Limit `max_tokens` to `ceiling`.
    pub fn capped(mut self, ceiling: u32) -> Self {
        self.max_tokens = self.max_tokens.min(ceiling);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = GenerationParams::default();
        assert_eq!(params.max_tokens, 150);
        assert_eq!(params.top_k, 40);
        assert_eq!(params.stop_sequences.len(), DEFAULT_STOP_SEQUENCES.len());
    }

    #[test]
    fn test_capped() {
        assert_eq!(GenerationParams::default().with_max_tokens(500).capped(200).max_tokens, 200);
        assert_eq!(GenerationParams::default().with_max_tokens(20).capped(200).max_tokens, 20);
    }
}
