//! Ownership and lifecycle of the loaded model.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use bmo_local_ai::{
    paths, select_config, Completion, GenerationParams, HostProfile, LocalAIError, MemoryInfo,
    ModelConfig,
};

use crate::config::ChatConfig;
use crate::error::ChatError;

const WARMUP_PROMPT: &str = "[INST] Hi BMO! [/INST]";

/// A loaded model that can complete prompts.
///
/// Implementations need not be safe for concurrent calls; callers go
/// through [`GenerationGate`](crate::GenerationGate).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion, LocalAIError>;
}

/// Turns a model file into a [`LanguageModel`].
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(
        &self,
        path: &Path,
        config: &ModelConfig,
    ) -> Result<Arc<dyn LanguageModel>, LocalAIError>;
}

/// Lifecycle of the model host.
///
/// `Uninitialized -> Loading -> Ready | Failed`. `Failed` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Loading => "loading",
            ServiceState::Ready => "ready",
            ServiceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Output of one inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResult {
    pub text: String,
    pub tokens_used: u32,
}

/// Facts about the model that was loaded.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedModelInfo {
    pub path: PathBuf,
    pub warmup_tokens_per_second: f64,
}

struct LoadedModel {
    model: Arc<dyn LanguageModel>,
    info: LoadedModelInfo,
}

/// Owns the single model handle for the process.
pub struct ModelHost {
    profile: HostProfile,
    config: ModelConfig,
    max_tokens_cap: u32,
    warmup_min_tokens_per_second: f64,
    state: RwLock<ServiceState>,
    loaded: RwLock<Option<LoadedModel>>,
}

/// Leaves the host `Failed` if `initialize` is dropped before it finishes.
struct LoadingGuard<'a> {
    state: &'a RwLock<ServiceState>,
    done: bool,
}

impl<'a> LoadingGuard<'a> {
    fn new(state: &'a RwLock<ServiceState>) -> Self {
        Self { state, done: false }
    }

    fn finish(mut self, outcome: ServiceState) {
        *self.state.write() = outcome;
        self.done = true;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            warn!("Model load was abandoned");
            *self.state.write() = ServiceState::Failed;
        }
    }
}

impl ModelHost {
    /// Create an uninitialized host tuned for `profile`.
    pub fn new(profile: HostProfile, chat_config: &ChatConfig) -> Self {
        Self {
            profile,
            config: select_config(profile),
            max_tokens_cap: chat_config.max_tokens_cap,
            warmup_min_tokens_per_second: chat_config.warmup_min_tokens_per_second,
            state: RwLock::new(ServiceState::Uninitialized),
            loaded: RwLock::new(None),
        }
    }

    pub fn profile(&self) -> HostProfile {
        self.profile
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ServiceState::Ready
    }

    /// Path and warm-up speed of the loaded model, once ready.
    pub fn loaded_model(&self) -> Option<LoadedModelInfo> {
        self.loaded.read().as_ref().map(|l| l.info.clone())
    }

    /// Load the first existing candidate and warm it up.
    ///
    /// Can only be called once. A slow warm-up is logged but still ends in
    /// `Ready`.
    pub async fn initialize(
        &self,
        loader: &dyn ModelLoader,
        candidates: &[PathBuf],
    ) -> Result<(), ChatError> {
        {
            let mut state = self.state.write();
            if *state != ServiceState::Uninitialized {
                return Err(ChatError::AlreadyInitialized(*state));
            }
            *state = ServiceState::Loading;
        }
        let loading = LoadingGuard::new(&self.state);

        match self.load(loader, candidates).await {
            Ok(loaded) => {
                *self.loaded.write() = Some(loaded);
                loading.finish(ServiceState::Ready);
                Ok(())
            }
            Err(e) => {
                error!("Failed to load BMO: {}", e);
                loading.finish(ServiceState::Failed);
                Err(e)
            }
        }
    }

    async fn load(
        &self,
        loader: &dyn ModelLoader,
        candidates: &[PathBuf],
    ) -> Result<LoadedModel, ChatError> {
        let path = match paths::first_existing(candidates) {
            Some(path) => path,
            None => {
                error!("No model file found! Searched locations:");
                for candidate in candidates {
                    error!("   - {}", candidate.display());
                }
                return Err(ChatError::ModelNotFound {
                    searched: candidates.to_vec(),
                });
            }
        };

        info!("Loading BMO's brain from: {}", path.display());
        let size = paths::file_size_gib(&path);
        if let Some(size) = size {
            info!("Model size: {:.2} GB", size);
        }
        match MemoryInfo::detect() {
            Some(memory) => {
                info!("Available RAM: {}", memory);
                if memory.is_low() {
                    warn!(
                        "Less than {:.0} GB of RAM available; a 7B model may swap. Consider a Q3_K_M model",
                        bmo_local_ai::LOW_MEMORY_GIB
                    );
                }
                if let Some(size) = size {
                    if size > memory.available_gib() {
                        warn!("Model is larger than available RAM");
                    }
                }
            }
            None => warn!("Could not read system memory"),
        }
        info!("Host profile: {}", self.profile);
        info!(
            threads = self.config.threads,
            gpu_layers = self.config.gpu_layers,
            context_size = self.config.context_size,
            batch_size = self.config.batch_size,
            use_mmap = self.config.use_mmap,
            use_mlock = self.config.use_mlock,
            "Model settings"
        );

        let model = loader
            .load(&path, &self.config)
            .await
            .map_err(ChatError::LoadFailure)?;

        let warmup_tokens_per_second = self.warm_up(model.as_ref()).await?;

        Ok(LoadedModel {
            model,
            info: LoadedModelInfo {
                path,
                warmup_tokens_per_second,
            },
        })
    }

    /// One short generation to prove the model answers. Returns tokens/second.
    async fn warm_up(&self, model: &dyn LanguageModel) -> Result<f64, ChatError> {
        info!("Testing BMO's circuits...");

        let params = GenerationParams::default()
            .with_max_tokens(20)
            .with_temperature(0.7)
            .with_stop_sequences(["[INST]", "</s>"]);

        let start = Instant::now();
        let completion = model
            .complete(WARMUP_PROMPT, &params)
            .await
            .map_err(ChatError::LoadFailure)?;
        let elapsed = start.elapsed().as_secs_f64();

        let speed = if elapsed > 0.0 {
            completion.tokens_used as f64 / elapsed
        } else {
            0.0
        };

        info!("Test response: '{}'", completion.text);
        info!("Speed: {:.2} tokens/second", speed);

        if speed < self.warmup_min_tokens_per_second {
            warn!(
                "Performance is slower than expected ({:.2} < {:.2} tokens/second)",
                speed, self.warmup_min_tokens_per_second
            );
            warn!("Try using a smaller model (Q3_K_M) for better speed");
        } else {
            info!("Good performance - BMO is ready!");
        }

        Ok(speed)
    }

    /// Run one completion. No retries.
    pub async fn infer(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<InferenceResult, ChatError> {
        let model = self.loaded.read().as_ref().map(|l| Arc::clone(&l.model));
        let model = match model {
            Some(model) => model,
            None => return Err(ChatError::ServiceNotReady(self.state())),
        };

        let params = params.clone().capped(self.max_tokens_cap);
        let completion = model
            .complete(prompt, &params)
            .await
            .map_err(ChatError::Generation)?;

        Ok(InferenceResult {
            text: completion.text,
            tokens_used: completion.tokens_used,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    /// Replies with canned text and records every prompt and params it saw.
    #[derive(Default)]
    pub(crate) struct EchoModel {
        pub(crate) reply: String,
        pub(crate) calls: Mutex<Vec<(String, GenerationParams)>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(
            &self,
            prompt: &str,
            params: &GenerationParams,
        ) -> Result<Completion, LocalAIError> {
            self.calls.lock().push((prompt.to_string(), params.clone()));
            if self.fail {
                return Err(LocalAIError::Api("model exploded".to_string()));
            }
            Ok(Completion {
                text: self.reply.clone(),
                tokens_used: self.reply.split_whitespace().count() as u32,
            })
        }
    }

    /// Hands out a prepared model, or fails like a broken load.
    pub(crate) struct StaticLoader {
        pub(crate) model: Option<Arc<dyn LanguageModel>>,
    }

    #[async_trait]
    impl ModelLoader for StaticLoader {
        async fn load(
            &self,
            path: &Path,
            _config: &ModelConfig,
        ) -> Result<Arc<dyn LanguageModel>, LocalAIError> {
            self.model.clone().ok_or_else(|| LocalAIError::ServerDied {
                port: bmo_local_ai::DEFAULT_PORT,
                model: path.to_path_buf(),
                status: "exit status: 1".to_string(),
            })
        }
    }

    /// A loader whose server never becomes ready.
    struct HangingLoader;

    #[async_trait]
    impl ModelLoader for HangingLoader {
        async fn load(
            &self,
            _path: &Path,
            _config: &ModelConfig,
        ) -> Result<Arc<dyn LanguageModel>, LocalAIError> {
            std::future::pending().await
        }
    }

    fn host() -> ModelHost {
        ModelHost::new(HostProfile::Generic { cores: 8 }, &ChatConfig::default())
    }

    fn model_file(dir: &Path) -> PathBuf {
        let path = dir.join("bmo.gguf");
        std::fs::write(&path, b"GGUF").unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_model() {
        let dir = tempdir().unwrap();
        let host = host();
        let loader = StaticLoader { model: None };
        let candidates = vec![dir.path().join("a.gguf"), dir.path().join("b.gguf")];

        let err = host.initialize(&loader, &candidates).await.unwrap_err();
        match err {
            ChatError::ModelNotFound { searched } => assert_eq!(searched, candidates),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(host.state(), ServiceState::Failed);
        assert!(!host.is_ready());
    }

    #[tokio::test]
    async fn test_load_failure() {
        let dir = tempdir().unwrap();
        let host = host();
        let loader = StaticLoader { model: None };

        let err = host
            .initialize(&loader, &[model_file(dir.path())])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::LoadFailure(_)));
        assert_eq!(host.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn test_failed_warmup_is_load_failure() {
        let dir = tempdir().unwrap();
        let host = host();
        let model = Arc::new(EchoModel {
            fail: true,
            ..Default::default()
        });
        let loader = StaticLoader { model: Some(model) };

        let err = host
            .initialize(&loader, &[model_file(dir.path())])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::LoadFailure(_)));
        assert_eq!(host.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn test_initialize_picks_first_existing_and_warms_up() {
        let dir = tempdir().unwrap();
        let host = host();
        let model = Arc::new(EchoModel {
            reply: "Beep boop hello".to_string(),
            ..Default::default()
        });
        let loader = StaticLoader {
            model: Some(model.clone()),
        };
        let existing = model_file(dir.path());

        host.initialize(&loader, &[dir.path().join("missing.gguf"), existing.clone()])
            .await
            .unwrap();

        assert!(host.is_ready());
        let info = host.loaded_model().unwrap();
        assert_eq!(info.path, existing);

        let calls = model.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, WARMUP_PROMPT);
        assert_eq!(calls[0].1.max_tokens, 20);
        assert_eq!(calls[0].1.stop_sequences, vec!["[INST]", "</s>"]);
    }

    #[tokio::test]
    async fn test_slow_warmup_still_ready() {
        let dir = tempdir().unwrap();
        let config = ChatConfig::builder()
            .warmup_min_tokens_per_second(f64::MAX)
            .build();
        let host = ModelHost::new(HostProfile::UnifiedMemory, &config);
        let loader = StaticLoader {
            model: Some(Arc::new(EchoModel::default())),
        };

        host.initialize(&loader, &[model_file(dir.path())])
            .await
            .unwrap();
        assert!(host.is_ready());
    }

    #[tokio::test]
    async fn test_initialize_only_once() {
        let dir = tempdir().unwrap();
        let host = host();
        let loader = StaticLoader {
            model: Some(Arc::new(EchoModel::default())),
        };
        let path = model_file(dir.path());

        host.initialize(&loader, &[path.clone()]).await.unwrap();
        assert!(matches!(
            host.initialize(&loader, &[path]).await,
            Err(ChatError::AlreadyInitialized(ServiceState::Ready))
        ));
    }

    #[tokio::test]
    async fn test_failed_is_terminal() {
        let dir = tempdir().unwrap();
        let host = host();
        let _ = host
            .initialize(&StaticLoader { model: None }, &[dir.path().join("x.gguf")])
            .await;

        let loader = StaticLoader {
            model: Some(Arc::new(EchoModel::default())),
        };
        assert!(matches!(
            host.initialize(&loader, &[model_file(dir.path())]).await,
            Err(ChatError::AlreadyInitialized(ServiceState::Failed))
        ));
        assert_eq!(host.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn test_abandoned_load_is_failed() {
        let dir = tempdir().unwrap();
        let host = host();
        let candidates = [model_file(dir.path())];

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            host.initialize(&HangingLoader, &candidates),
        )
        .await;
        assert!(timed_out.is_err());

        assert_eq!(host.state(), ServiceState::Failed);
        assert!(!host.is_ready());
        assert!(matches!(
            host.initialize(&HangingLoader, &candidates).await,
            Err(ChatError::AlreadyInitialized(ServiceState::Failed))
        ));
    }

    #[tokio::test]
    async fn test_infer_before_ready() {
        let host = host();
        let result = host.infer("hi", &GenerationParams::default()).await;
        assert!(matches!(
            result,
            Err(ChatError::ServiceNotReady(ServiceState::Uninitialized))
        ));
    }

    #[tokio::test]
    async fn test_infer_caps_tokens() {
        let dir = tempdir().unwrap();
        let host = host();
        let model = Arc::new(EchoModel {
            reply: "ok".to_string(),
            ..Default::default()
        });
        let loader = StaticLoader {
            model: Some(model.clone()),
        };
        host.initialize(&loader, &[model_file(dir.path())])
            .await
            .unwrap();

        let result = host
            .infer("prompt", &GenerationParams::default().with_max_tokens(500))
            .await
            .unwrap();
        assert_eq!(result.text, "ok");
        assert_eq!(model.calls.lock().last().unwrap().1.max_tokens, 200);
    }

    #[test]
    fn test_config_follows_profile() {
        let host = ModelHost::new(HostProfile::UnifiedMemory, &ChatConfig::default());
        assert_eq!(host.config().gpu_layers, 35);
        assert_eq!(host.state(), ServiceState::Uninitialized);
    }
}
