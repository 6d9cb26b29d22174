//! # BMO Conversation Core
//!
//! Sits between a request router and a single locally hosted language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌────────────────┐
//! │ ChatService  │ --> │  GenerationGate  │ --> │   ModelHost    │
//! │  generate()  │     │  (one at a time) │     │ (llama-server) │
//! └──────┬───────┘     └──────────────────┘     └────────────────┘
//!        │
//!  ┌─────┴──────────────┐   ┌──────────────┐
//!  │ ConversationStore  │   │     Mood     │
//!  │ (per session, ≤6)  │   │  classifier  │
//!  └────────────────────┘   └──────────────┘
//! ```
//!
//! A turn holds the gate from prompt assembly until its exchange is
//! recorded, so two callers never build prompts from the same stale history.
//! Status and reset only touch the per-session locks and stay responsive
//! while a generation runs.
//!
//! ## Usage
//!
//! ```ignore
//! use bmo_core::{ChatConfig, ChatService, LlamaCppLoader, SessionId};
//! use bmo_local_ai::{GenerationParams, HostProfile};
//!
//! let config = ChatConfig::from_env();
//! let service = ChatService::new(&config, HostProfile::detect());
//! service
//!     .initialize(&LlamaCppLoader::new(&config), &config.model_candidates)
//!     .await?;
//!
//! let reply = service
//!     .generate(&SessionId::default(), "Hi BMO!", &GenerationParams::default(), false)
//!     .await?;
//! ```

mod backend;
mod config;
mod conversation;
mod error;
mod gate;
mod host;
pub mod mood;
mod protocol;
mod service;

pub use backend::{LlamaCppBackend, LlamaCppLoader};
pub use config::{ChatConfig, ChatConfigBuilder};
pub use conversation::{build_context, Conversation, ConversationStore, Exchange, SessionId, PERSONA};
pub use error::ChatError;
pub use gate::GenerationGate;
pub use host::{InferenceResult, LanguageModel, LoadedModelInfo, ModelHost, ModelLoader, ServiceState};
pub use mood::Mood;
pub use protocol::{ChatRequest, ChatResponse, ResetReply};
pub use service::{
    clean_response, ChatReply, ChatService, ServiceStatus, EMPTY_RESPONSE_FALLBACK, GLITCH_RESPONSE,
};

// Re-export local AI types
pub use bmo_local_ai::{
    cpu_cores, paths as local_ai_paths, select_config, Completion, GenerationParams, HostProfile,
    LocalAIError, MemoryInfo, ModelConfig, ModelInfo, ModelManager, DEFAULT_MODEL_FILENAME,
    DEFAULT_MODEL_NAME, DEFAULT_PORT as DEFAULT_LOCAL_AI_PORT, LOW_MEMORY_GIB,
    SMALL_MODEL_FILENAME, SMALL_MODEL_NAME,
};
