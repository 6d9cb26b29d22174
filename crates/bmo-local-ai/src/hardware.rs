//! Host detection and the inference tuning table.

use serde::Serialize;
use std::fmt;
use sysinfo::System;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Below this much available RAM a 7B model is likely to swap.
pub const LOW_MEMORY_GIB: f64 = 6.0;

/// Coarse hardware class used to pick inference settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HostProfile {
    /// ARM host with unified memory and a GPU that llama.cpp can offload to
    /// (Apple Silicon).
    UnifiedMemory,
    /// Any other host. Inference runs on CPU threads only.
    Generic { cores: usize },
}

impl HostProfile {
    /// Detect the profile of the machine we are running on.
    pub fn detect() -> Self {
        Self::from_arch(std::env::consts::ARCH, cpu_cores())
    }

    /// Classify a processor architecture string.
    ///
    /// Anything that is not recognisably ARM is treated as a generic host.
    pub fn from_arch(arch: &str, cores: usize) -> Self {
        let arch = arch.to_ascii_lowercase();
        if arch.contains("arm") || arch.contains("aarch64") {
            HostProfile::UnifiedMemory
        } else {
            HostProfile::Generic { cores }
        }
    }
}

impl fmt::Display for HostProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostProfile::UnifiedMemory => write!(f, "unified-memory (GPU offload)"),
            HostProfile::Generic { cores } => write!(f, "generic CPU ({} cores)", cores),
        }
    }
}

/// Inference settings for the loaded model. Chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelConfig {
    /// CPU threads used for generation.
    pub threads: u32,
    /// Layers offloaded to the accelerator (0 = CPU only).
    pub gpu_layers: u32,
    /// Context window in tokens.
    pub context_size: u32,
    /// Prompt processing batch size.
    pub batch_size: u32,
    /// Memory-map the model file.
    pub use_mmap: bool,
    /// Lock model pages in RAM.
    pub use_mlock: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            gpu_layers: 0,
            context_size: 2048,
            batch_size: 512,
            use_mmap: true,
            use_mlock: false,
        }
    }
}

impl ModelConfig {
    /// Command-line arguments for `llama-server` matching this config.
    pub fn server_args(&self) -> Vec<String> {
        let mut args = vec![
            "--threads".to_string(),
            self.threads.to_string(),
            "--n-gpu-layers".to_string(),
            self.gpu_layers.to_string(),
            "--ctx-size".to_string(),
            self.context_size.to_string(),
            "--batch-size".to_string(),
            self.batch_size.to_string(),
        ];
        if !self.use_mmap {
            args.push("--no-mmap".to_string());
        }
        if self.use_mlock {
            args.push("--mlock".to_string());
        }
        args
    }
}

/// Logical CPU count of this machine.
pub fn cpu_cores() -> usize {
    num_cpus::get()
}

/// Physical memory snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryInfo {
    /// Read current memory figures. `None` when the platform reports nothing.
    pub fn detect() -> Option<Self> {
        let mut sys = System::new();
        sys.refresh_memory();
        if sys.total_memory() == 0 {
            return None;
        }
        Some(Self {
            total_bytes: sys.total_memory(),
            available_bytes: sys.available_memory(),
        })
    }

    pub fn total_gib(&self) -> f64 {
        self.total_bytes as f64 / GIB
    }

    pub fn available_gib(&self) -> f64 {
        self.available_bytes as f64 / GIB
    }

    /// Whether available RAM is under [`LOW_MEMORY_GIB`].
    pub fn is_low(&self) -> bool {
        self.available_gib() < LOW_MEMORY_GIB
    }
}

impl fmt::Display for MemoryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} GB available of {:.2} GB",
            self.available_gib(),
            self.total_gib()
        )
    }
}

/// Map a host profile to its inference settings.
pub fn select_config(profile: HostProfile) -> ModelConfig {
    let base = ModelConfig::default();
    match profile {
        HostProfile::UnifiedMemory => ModelConfig {
            threads: 4,
            gpu_layers: 35,
            batch_size: 256,
            ..base
        },
        HostProfile::Generic { cores } => {
            let threads = cores.saturating_sub(2).clamp(4, 8) as u32;
            ModelConfig {
                threads,
                gpu_layers: 0,
                ..base
            }
        }
    }
}
