//! CLI commands.

pub mod ask;
pub mod chat;
pub mod diagnose;
pub mod info;
pub mod model;

use std::path::PathBuf;
use std::sync::Arc;

use bmo_core::{ChatConfig, ChatService, HostProfile, LlamaCppLoader};

/// Options shared by the commands that load a model.
#[derive(Debug, Clone, Default, clap::Args)]
pub(crate) struct ServiceArgs {
    /// Model file to try before the default locations
    #[arg(long)]
    pub(crate) model: Option<PathBuf>,
    /// Port for the llama-server child process
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// llama-server binary
    #[arg(long)]
    pub(crate) server_bin: Option<PathBuf>,
    /// Exchanges kept per conversation
    #[arg(long)]
    pub(crate) max_history: Option<usize>,
}

impl ServiceArgs {
    /// Environment config with command-line overrides applied.
    pub(crate) fn config(&self) -> ChatConfig {
        let mut config = ChatConfig::from_env();
        if let Some(model) = &self.model {
            config.model_candidates.insert(0, model.clone());
        }
        if let Some(port) = self.port {
            config.server_port = port;
        }
        if let Some(bin) = &self.server_bin {
            config.server_binary = bin.clone();
        }
        if let Some(n) = self.max_history {
            config.max_history = n;
        }
        config
    }

    /// Build the service and load the model. Load failures are fatal.
    pub(crate) async fn start(&self) -> miette::Result<Arc<ChatService>> {
        let config = self.config();
        let service = ChatService::new(&config, HostProfile::detect());
        let loader = LlamaCppLoader::new(&config);

        service
            .initialize(&loader, &config.model_candidates)
            .await
            .map_err(|e| miette::miette!("BMO can't start: {}", e))?;

        Ok(Arc::new(service))
    }
}
