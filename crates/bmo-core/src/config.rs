//! Chat service configuration.

use std::path::PathBuf;
use std::time::Duration;

use bmo_local_ai::{paths, DEFAULT_PORT};

use crate::conversation::PERSONA;

/// Configuration for the chat service.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Model files to try, first existing one wins
    pub model_candidates: Vec<PathBuf>,
    /// Persona preamble placed at the top of every prompt
    pub persona: String,
    /// Exchanges kept per conversation
    pub max_history: usize,
    /// Exchanges replayed into each prompt
    pub context_turns: usize,
    /// Hard ceiling on tokens generated per turn
    pub max_tokens_cap: u32,
    /// Warm-up speed below which a performance warning is logged
    pub warmup_min_tokens_per_second: f64,
    /// Port for the llama-server child process
    pub server_port: u16,
    /// llama-server binary
    pub server_binary: PathBuf,
    /// How long to wait for the model to load
    pub startup_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model_candidates: paths::default_candidates(),
            persona: PERSONA.to_string(),
            max_history: 6,
            context_turns: 4,
            max_tokens_cap: 200,
            warmup_min_tokens_per_second: 2.0,
            server_port: DEFAULT_PORT,
            server_binary: paths::llama_server_path(),
            startup_timeout: Duration::from_secs(300),
        }
    }
}

impl ChatConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup. Unset or unparsable
    /// values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("BMO_MODEL_PATH") {
            config.model_candidates.insert(0, PathBuf::from(path));
        }

        if let Some(n) = lookup("BMO_MAX_HISTORY").and_then(|v| v.parse().ok()) {
            config.max_history = n;
        }

        if let Some(n) = lookup("BMO_CONTEXT_TURNS").and_then(|v| v.parse().ok()) {
            config.context_turns = n;
        }

        if let Some(n) = lookup("BMO_MAX_TOKENS_CAP").and_then(|v| v.parse().ok()) {
            config.max_tokens_cap = n;
        }

        if let Some(tps) = lookup("BMO_WARMUP_MIN_TPS").and_then(|v| v.parse().ok()) {
            config.warmup_min_tokens_per_second = tps;
        }

        if let Some(port) = lookup("BMO_PORT").and_then(|v| v.parse().ok()) {
            config.server_port = port;
        }

        if let Some(bin) = lookup("BMO_SERVER_BIN") {
            config.server_binary = PathBuf::from(bin);
        }

        config
    }

    /// Create a builder for configuration.
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }
}

/// Builder for chat configuration.
#[derive(Debug, Default)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    /// Replace the candidate list.
    pub fn model_candidates<I, P>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config.model_candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// Try `path` before every other candidate.
    pub fn prefer_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model_candidates.insert(0, path.into());
        self
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.config.persona = persona.into();
        self
    }

    pub fn max_history(mut self, n: usize) -> Self {
        self.config.max_history = n;
        self
    }

    pub fn context_turns(mut self, n: usize) -> Self {
        self.config.context_turns = n;
        self
    }

    pub fn max_tokens_cap(mut self, n: u32) -> Self {
        self.config.max_tokens_cap = n;
        self
    }

    pub fn warmup_min_tokens_per_second(mut self, tps: f64) -> Self {
        self.config.warmup_min_tokens_per_second = tps;
        self
    }

    pub fn server_port(mut self, port: u16) -> Self {
        self.config.server_port = port;
        self
    }

    pub fn server_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.server_binary = path.into();
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.config.startup_timeout = timeout;
        self
    }

    pub fn build(self) -> ChatConfig {
        self.config
    }
}
