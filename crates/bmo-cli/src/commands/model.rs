//! Model management commands.

use bmo_core::{local_ai_paths, ModelManager};
use std::path::Path;

/// List installed models.
pub(crate) fn list() -> miette::Result<()> {
    let manager = ModelManager::new();
    let models = manager
        .list_installed()
        .map_err(|e| miette::miette!("Failed to list models: {}", e))?;

    if models.is_empty() {
        println!("No models installed.");
        println!();
        println!("To install the default model, run:");
        println!("  bmo model pull");
        return Ok(());
    }

    println!("Installed models:");
    for model in models {
        println!("  - {}", model);
    }

    println!();
    println!("Models directory: {}", manager.dir().display());

    Ok(())
}

/// Download a model, or install one from a local `.gguf` file.
pub(crate) async fn pull(path: Option<&Path>, small: bool) -> miette::Result<()> {
    let manager = ModelManager::new();

    local_ai_paths::ensure_dirs()
        .map_err(|e| miette::miette!("Failed to create data directories: {}", e))?;

    if let Some(source_path) = path {
        if !source_path.is_file() {
            return Err(miette::miette!("File not found: {}", source_path.display()));
        }

        let ext = source_path.extension().and_then(|e| e.to_str());
        if ext != Some("gguf") {
            return Err(miette::miette!(
                "Expected a .gguf file, got: {}",
                source_path.display()
            ));
        }

        println!("Installing model from: {}", source_path.display());
        let dest = manager
            .install_from_path(source_path)
            .map_err(|e| miette::miette!("Failed to install model: {}", e))?;

        println!("Model installed to: {}", dest.display());
        return Ok(());
    }

    let model = if small {
        ModelManager::small_model()
    } else {
        ModelManager::default_model()
    };

    if manager.is_installed(&model.filename) {
        println!("Model '{}' is already installed.", model.name);
        return Ok(());
    }

    println!("Downloading model: {}", model.name);
    println!("This may take a while depending on your connection...");
    println!();

    let path = manager
        .download(&model)
        .await
        .map_err(|e| miette::miette!("Failed to download model: {}", e))?;

    println!();
    println!("Model downloaded successfully!");
    println!("Location: {}", path.display());

    Ok(())
}

/// Delete an installed model.
pub(crate) fn remove(name: &str) -> miette::Result<()> {
    let manager = ModelManager::new();
    let path = manager
        .remove(name)
        .map_err(|e| miette::miette!("Failed to remove model: {}", e))?;
    println!("Removed {}", path.display());
    Ok(())
}

/// Show model directories and defaults.
pub(crate) fn info() -> miette::Result<()> {
    println!("BMO Local AI Configuration");
    println!("==========================");
    println!();
    println!("Data directory:   {}", local_ai_paths::bmo_data_dir().display());
    println!("Models directory: {}", local_ai_paths::models_dir().display());
    println!("Binaries:         {}", local_ai_paths::bin_dir().display());
    println!();

    let server = local_ai_paths::llama_server_path();
    println!("Server binary:    {}", server.display());
    println!("  Exists: {}", server.is_file());
    println!();

    let manager = ModelManager::new();
    for model in [ModelManager::default_model(), ModelManager::small_model()] {
        println!("{}", model.name);
        println!("  File:      {}", model.filename);
        println!("  Installed: {}", manager.is_installed(&model.filename));
    }

    Ok(())
}
