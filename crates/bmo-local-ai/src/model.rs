//! Model download and management.

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::LocalAIError;
use crate::paths::models_dir;
use crate::{DEFAULT_MODEL_FILENAME, DEFAULT_MODEL_NAME, SMALL_MODEL_FILENAME, SMALL_MODEL_NAME};

const HF_REPO: &str = "https://huggingface.co/TheBloke/Mistral-7B-Instruct-v0.1-GGUF/resolve/main";

/// Model registry entry.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Display name of the model.
    pub name: String,
    /// Filename on disk.
    pub filename: String,
    /// Download URL.
    pub url: String,
    /// Expected SHA256 checksum (optional).
    pub sha256: Option<String>,
    /// Size in bytes (for progress display).
    pub size_bytes: Option<u64>,
}

/// Manager for downloading and managing model files.
pub struct ModelManager {
    client: reqwest::Client,
    dir: PathBuf,
}

impl ModelManager {
    /// Create a manager over the default models directory (~/.bmo/models).
    pub fn new() -> Self {
        Self::with_dir(models_dir())
    }

    /// Create a manager over a specific directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            dir: dir.into(),
        }
    }

    /// Directory this manager installs into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the default model info (Mistral 7B, Q4_K_M quantisation).
    pub fn default_model() -> ModelInfo {
        ModelInfo {
            name: DEFAULT_MODEL_NAME.to_string(),
            filename: DEFAULT_MODEL_FILENAME.to_string(),
            url: format!("{}/{}", HF_REPO, DEFAULT_MODEL_FILENAME),
            sha256: None,
            size_bytes: None,
        }
    }

    /// Smaller, faster alternative for hosts that warm up slowly.
    pub fn small_model() -> ModelInfo {
        ModelInfo {
            name: SMALL_MODEL_NAME.to_string(),
            filename: SMALL_MODEL_FILENAME.to_string(),
            url: format!("{}/{}", HF_REPO, SMALL_MODEL_FILENAME),
            sha256: None,
            size_bytes: None,
        }
    }

    /// List all installed models (file stems of `.gguf` files).
    pub fn list_installed(&self) -> Result<Vec<String>, LocalAIError> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut models: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| ext == "gguf")
                    .unwrap_or(false)
            })
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|s| s.trim_end_matches(".gguf").to_string())
            })
            .collect();
        models.sort();

        Ok(models)
    }

    /// Check if a model is installed.
    pub fn is_installed(&self, filename: &str) -> bool {
        self.model_path(filename).exists()
    }

    /// Path a model file has (or would have) in this manager's directory.
    pub fn model_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Download a model from URL.
    pub async fn download(&self, model: &ModelInfo) -> Result<PathBuf, LocalAIError> {
        fs::create_dir_all(&self.dir)?;

        let dest_path = self.model_path(&model.filename);

        info!("Downloading model '{}' to {:?}", model.name, dest_path);

        let response = self
            .client
            .get(&model.url)
            .send()
            .await
            .map_err(|e| LocalAIError::DownloadFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LocalAIError::DownloadFailed(format!(
                "HTTP {}: {}",
                response.status(),
                model.url
            )));
        }

        let total_size = response.content_length().or(model.size_bytes);

        let pb = match total_size {
            Some(size) => {
                let pb = ProgressBar::new(size);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {bytes} downloaded")
                {
                    pb.set_style(style);
                }
                pb
            }
        };

        // Stream into a partial file so an interrupted download is never
        // picked up as a model candidate.
        let partial_path = dest_path.with_extension("gguf.part");
        let mut file = File::create(&partial_path)?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LocalAIError::DownloadFailed(e.to_string()))?;
            file.write_all(&chunk)?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush()?;
        drop(file);

        pb.finish_with_message("Download complete");

        if let Some(expected) = &model.sha256 {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = fs::remove_file(&partial_path);
                return Err(LocalAIError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
            debug!("Checksum verified: {}", actual);
        }

        fs::rename(&partial_path, &dest_path)?;

        info!("Model '{}' downloaded successfully", model.name);
        Ok(dest_path)
    }

    /// Install a model from a local file path.
    pub fn install_from_path(&self, source: &Path) -> Result<PathBuf, LocalAIError> {
        if !source.is_file() {
            return Err(LocalAIError::ModelNotFound(source.display().to_string()));
        }

        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LocalAIError::ModelNotFound("Invalid path".to_string()))?;

        fs::create_dir_all(&self.dir)?;
        let dest_path = self.model_path(filename);

        if source == dest_path {
            return Ok(dest_path);
        }

        info!("Installing model from {:?} to {:?}", source, dest_path);
        fs::copy(source, &dest_path)?;

        Ok(dest_path)
    }

    /// Remove an installed model. `name` may be given with or without the
    /// `.gguf` extension, as printed by [`list_installed`](Self::list_installed).
    pub fn remove(&self, name: &str) -> Result<PathBuf, LocalAIError> {
        let filename = if name.ends_with(".gguf") {
            name.to_string()
        } else {
            format!("{}.gguf", name)
        };
        let path = self.model_path(&filename);
        if !path.is_file() {
            return Err(LocalAIError::ModelNotFound(filename));
        }
        fs::remove_file(&path)?;
        info!("Removed model: {}", filename);
        Ok(path)
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}
