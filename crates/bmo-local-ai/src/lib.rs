//! Local model backend for BMO using llama.cpp.
//!
//! BMO keeps exactly one model loaded for the lifetime of the process. This
//! crate owns everything needed to get there: finding a GGUF file on disk,
//! picking inference settings that suit the host, running a `llama-server`
//! child process with those settings, and talking to it over loopback HTTP.

mod client;
mod error;
mod hardware;
mod model;
mod params;
pub mod paths;
mod server;

pub use client::{Completion, LlamaCppClient};
pub use error::LocalAIError;
pub use hardware::{cpu_cores, select_config, HostProfile, MemoryInfo, ModelConfig, LOW_MEMORY_GIB};
pub use model::{ModelInfo, ModelManager};
pub use params::{GenerationParams, DEFAULT_STOP_SEQUENCES};
pub use server::LlamaCppServer;

/// Default port for the local llama-server instance.
pub const DEFAULT_PORT: u16 = 11436;

/// Default model name.
pub const DEFAULT_MODEL_NAME: &str = "mistral-7b-instruct-v0.1-q4";

/// Default model filename, as published upstream.
pub const DEFAULT_MODEL_FILENAME: &str = "mistral-7b-instruct-v0.1.Q4_K_M.gguf";

/// Smaller quantisation for hosts that warm up slowly.
pub const SMALL_MODEL_NAME: &str = "mistral-7b-instruct-v0.1-q3";

/// Filename of the smaller quantisation.
pub const SMALL_MODEL_FILENAME: &str = "mistral-7b-instruct-v0.1.Q3_K_M.gguf";
