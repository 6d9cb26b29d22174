//! Process manager for llama-server.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::LlamaCppClient;
use crate::error::LocalAIError;
use crate::hardware::ModelConfig;
use crate::paths::llama_server_path;
use crate::DEFAULT_PORT;

/// Manager for the llama-server process.
pub struct LlamaCppServer {
    port: u16,
    binary: PathBuf,
    model: PathBuf,
    config: ModelConfig,
    process: Option<Child>,
}

impl LlamaCppServer {
    /// Create a new server manager for a model file.
    pub fn new(model: impl Into<PathBuf>, config: ModelConfig) -> Self {
        Self {
            port: DEFAULT_PORT,
            binary: llama_server_path(),
            model: model.into(),
            config,
            process: None,
        }
    }

    /// Set a custom port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use a llama-server binary other than the one in the data directory.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Get the port this server is configured to use.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the model file this server loads.
    pub fn model(&self) -> &Path {
        &self.model
    }

    /// Check if the server binary exists.
    pub fn binary_exists(&self) -> bool {
        self.binary.is_file()
    }

    /// Full argument list passed to llama-server.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--model".to_string(),
            self.model.display().to_string(),
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        args.extend(self.config.server_args());
        args
    }

    /// Start the llama-server process.
    pub fn start(&mut self) -> Result<(), LocalAIError> {
        // Check prerequisites
        if !self.binary_exists() {
            return Err(LocalAIError::ServerBinaryNotFound(
                self.binary.display().to_string(),
            ));
        }

        if !self.model.exists() {
            return Err(LocalAIError::ModelNotFound(
                self.model.display().to_string(),
            ));
        }

        info!(
            "Starting llama-server on port {} with model {}",
            self.port,
            self.model.display()
        );

        let child = Command::new(&self.binary)
            .args(self.args())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| LocalAIError::ServerStartFailed {
                binary: self.binary.clone(),
                source,
            })?;

        debug!("llama-server process started with PID: {}", child.id());
        self.process = Some(child);

        Ok(())
    }

    /// Wait for the server to finish loading the model.
    ///
    /// Fails early if the process exits while we are waiting.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<(), LocalAIError> {
        let client = self.client();
        let start = std::time::Instant::now();
        let check_interval = Duration::from_millis(500);

        info!("Waiting for llama-server to load the model...");

        while start.elapsed() < timeout {
            match client.check_health().await {
                Ok(()) => {
                    info!("llama-server is ready");
                    return Ok(());
                }
                Err(_) => {
                    if let Some(ref mut process) = self.process {
                        if let Ok(Some(status)) = process.try_wait() {
                            self.process = None;
                            return Err(LocalAIError::ServerDied {
                                port: self.port,
                                model: self.model.clone(),
                                status: status.to_string(),
                            });
                        }
                        debug!("Server not ready yet, PID: {}", process.id());
                    }
                    sleep(check_interval).await;
                }
            }
        }

        Err(LocalAIError::ServerStartTimeout {
            port: self.port,
            model: self.model.clone(),
            secs: timeout.as_secs(),
        })
    }

    /// Stop the server process.
    pub fn stop(&mut self) -> Result<(), LocalAIError> {
        if let Some(mut child) = self.process.take() {
            info!("Stopping llama-server (PID: {})", child.id());

            // Try graceful shutdown first
            #[cfg(unix)]
            {
                unsafe {
                    libc::kill(child.id() as i32, libc::SIGTERM);
                }
                std::thread::sleep(Duration::from_millis(500));
            }

            // Force kill if still running
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Server exited with status: {:?}", status);
                }
                Ok(None) => {
                    warn!("Server didn't exit gracefully, killing...");
                    let _ = child.kill();
                    let _ = child.wait();
                }
                Err(e) => {
                    warn!("Error checking server status: {}", e);
                    let _ = child.kill();
                }
            }
        }
        Ok(())
    }

    /// Check if the server process is running.
    pub fn is_running(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            match child.try_wait() {
                Ok(Some(_)) => {
                    self.process = None;
                    false
                }
                Ok(None) => true,
                Err(_) => false,
            }
        } else {
            false
        }
    }

    /// Get a client connected to this server.
    pub fn client(&self) -> LlamaCppClient {
        LlamaCppClient::with_port(self.port)
    }
}

impl Drop for LlamaCppServer {
    fn drop(&mut self) {
        if self.process.is_some() {
            let _ = self.stop();
        }
    }
}
