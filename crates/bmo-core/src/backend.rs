//! llama-server backed [`LanguageModel`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bmo_local_ai::{
    Completion, GenerationParams, LlamaCppClient, LlamaCppServer, LocalAIError, ModelConfig,
};

use crate::config::ChatConfig;
use crate::host::{LanguageModel, ModelLoader};

/// A running llama-server plus a client for it.
///
/// The child process is stopped when this is dropped.
pub struct LlamaCppBackend {
    server: Mutex<LlamaCppServer>,
    client: LlamaCppClient,
}

impl LlamaCppBackend {
    fn new(server: LlamaCppServer) -> Self {
        let client = server.client();
        Self {
            server: Mutex::new(server),
            client,
        }
    }
}

#[async_trait]
impl LanguageModel for LlamaCppBackend {
    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion, LocalAIError> {
        // A crashed server would otherwise show up as a connect timeout.
        if !self.server.lock().is_running() {
            return Err(LocalAIError::ServerNotRunning(
                self.client.base_url().to_string(),
            ));
        }
        self.client.complete(prompt, params).await
    }
}

/// Starts llama-server for a model file and waits for it to load.
pub struct LlamaCppLoader {
    port: u16,
    binary: PathBuf,
    startup_timeout: Duration,
}

impl LlamaCppLoader {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            port: config.server_port,
            binary: config.server_binary.clone(),
            startup_timeout: config.startup_timeout,
        }
    }
}

#[async_trait]
impl ModelLoader for LlamaCppLoader {
    async fn load(
        &self,
        path: &Path,
        config: &ModelConfig,
    ) -> Result<Arc<dyn LanguageModel>, LocalAIError> {
        let mut server = LlamaCppServer::new(path, config.clone())
            .with_port(self.port)
            .with_binary(&self.binary);

        server.start()?;
        // On failure `server` is dropped here, which stops the child.
        server.wait_ready(self.startup_timeout).await?;

        Ok(Arc::new(LlamaCppBackend::new(server)))
    }
}
