//! Path utilities for BMO data directories and model discovery.

use std::path::{Path, PathBuf};

use crate::{DEFAULT_MODEL_FILENAME, SMALL_MODEL_FILENAME};

/// Model files looked up relative to the working directory, in priority order.
const RELATIVE_CANDIDATES: &[&str] = &[
    "models/mistral-7b-v0.1.Q4_K_M.gguf",
    "models/mistral-7b-v0.1.Q3_K_M.gguf",
    "models/mistral-7b-v0.1.Q5_K_M.gguf",
    "mistral-7b-v0.1.Q4_K_M.gguf",
    "models/mistral-model.gguf",
    "mistral-model.gguf",
];

/// Get the BMO data directory (~/.bmo/).
///
/// Falls back to `./.bmo` when no home directory can be determined.
pub fn bmo_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bmo")
}

/// Get the models directory (~/.bmo/models/).
pub fn models_dir() -> PathBuf {
    bmo_data_dir().join("models")
}

/// Get the bin directory (~/.bmo/bin/).
pub fn bin_dir() -> PathBuf {
    bmo_data_dir().join("bin")
}

/// Get the path to the llama-server binary.
pub fn llama_server_path() -> PathBuf {
    let binary_name = if cfg!(target_os = "windows") {
        "llama-server.exe"
    } else {
        "llama-server"
    };
    bin_dir().join(binary_name)
}

/// Get the path to a model file.
pub fn model_path(filename: &str) -> PathBuf {
    models_dir().join(filename)
}

/// Ensure the BMO data directories exist.
pub fn ensure_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(bmo_data_dir())?;
    std::fs::create_dir_all(models_dir())?;
    std::fs::create_dir_all(bin_dir())?;
    Ok(())
}

/// Candidate model files in the order they should be tried.
///
/// The working-directory locations come first, then the models directory of
/// the BMO data directory (see [`candidates_in`]).
pub fn default_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = RELATIVE_CANDIDATES.iter().map(PathBuf::from).collect();
    candidates.extend(candidates_in(&models_dir()));
    candidates
}

/// Candidate model files inside one models directory.
///
/// The files `bmo model pull` downloads come first, then the names from the
/// working-directory list, then any other `.gguf` file found there (sorted),
/// so a model installed from a local path is also picked up.
pub fn candidates_in(dir: &Path) -> Vec<PathBuf> {
    let mut names: Vec<String> = vec![
        DEFAULT_MODEL_FILENAME.to_string(),
        SMALL_MODEL_FILENAME.to_string(),
    ];
    for relative in RELATIVE_CANDIDATES {
        if let Some(name) = Path::new(relative).file_name().and_then(|n| n.to_str()) {
            if !names.iter().any(|known| known == name) {
                names.push(name.to_string());
            }
        }
    }

    let mut installed: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
                .filter(|name| name.ends_with(".gguf"))
                .filter(|name| !names.contains(name))
                .collect()
        })
        .unwrap_or_default();
    installed.sort();
    names.extend(installed);

    names.into_iter().map(|name| dir.join(name)).collect()
}

/// Return the first candidate that exists as a regular file.
pub fn first_existing<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(AsRef::as_ref)
        .find(|path| path.is_file())
        .map(Path::to_path_buf)
}

/// Size of a file in GiB, for log output.
pub fn file_size_gib(path: &Path) -> Option<f64> {
    std::fs::metadata(path)
        .ok()
        .map(|m| m.len() as f64 / (1024.0 * 1024.0 * 1024.0))
}
