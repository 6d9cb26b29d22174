//! Errors from the llama-server process, its HTTP API and model files.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocalAIError {
    /// Transport failure talking to llama-server.
    #[error("request to llama-server failed: {0}")]
    Http(#[from] reqwest::Error),

    /// llama-server answered with a body we could not decode.
    #[error("malformed llama-server response: {0}")]
    Json(#[from] serde_json::Error),

    /// llama-server answered with a non-success status.
    #[error("llama-server rejected the request: {0}")]
    Api(String),

    /// Nothing healthy is listening at the given base URL.
    #[error("llama-server is not answering at {0}")]
    ServerNotRunning(String),

    /// The binary exists but could not be spawned.
    #[error("could not launch {}: {source}", .binary.display())]
    ServerStartFailed {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The child exited before it finished loading the model.
    #[error("llama-server on port {port} exited while loading {} ({status})", .model.display())]
    ServerDied {
        port: u16,
        model: PathBuf,
        status: String,
    },

    /// Model loading did not finish in time.
    #[error(
        "llama-server on port {port} did not finish loading {} within {secs}s",
        .model.display()
    )]
    ServerStartTimeout { port: u16, model: PathBuf, secs: u64 },

    #[error("model file '{0}' not found; run `bmo model pull` or pass --model")]
    ModelNotFound(String),

    #[error("model download failed: {0}")]
    DownloadFailed(String),

    #[error("downloaded model failed its SHA-256 check (expected {expected}, got {actual})")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("llama-server binary not found at {0}; set BMO_SERVER_BIN or pass --server-bin")]
    ServerBinaryNotFound(String),

    #[error("model file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
