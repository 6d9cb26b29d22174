//! Diagnose command - report what a model load would see, and optionally
//! do one.

use bmo_core::{
    cpu_cores, local_ai_paths, select_config, GenerationParams, HostProfile, MemoryInfo,
    ModelManager, LOW_MEMORY_GIB,
};

use super::ServiceArgs;

pub(crate) fn run(service_args: &ServiceArgs) -> miette::Result<()> {
    let config = service_args.config();
    let profile = HostProfile::detect();
    let model_config = select_config(profile);

    println!("BMO Diagnostics");
    println!("===============");
    println!();
    println!("Host:");
    println!("  Arch:    {}", std::env::consts::ARCH);
    println!("  Cores:   {}", cpu_cores());
    println!("  Profile: {}", profile);
    match MemoryInfo::detect() {
        Some(memory) => {
            println!("  RAM:     {:.2} GB total", memory.total_gib());
            println!("           {:.2} GB available", memory.available_gib());
            if memory.is_low() {
                println!();
                println!(
                    "Warning: less than {:.0} GB of RAM available; a 7B model may not fit.",
                    LOW_MEMORY_GIB
                );
                println!("   Consider a smaller model: bmo model pull --small");
            }
        }
        None => println!("  RAM:     unknown"),
    }
    println!();

    println!("Inference settings:");
    println!("  Threads:     {}", model_config.threads);
    println!("  GPU layers:  {}", model_config.gpu_layers);
    println!("  Context:     {}", model_config.context_size);
    println!("  Batch:       {}", model_config.batch_size);
    println!("  mmap/mlock:  {}/{}", model_config.use_mmap, model_config.use_mlock);
    println!("  Server args: {}", model_config.server_args().join(" "));
    println!();

    println!("Model candidates (first existing is loaded):");
    let chosen = local_ai_paths::first_existing(&config.model_candidates);
    for candidate in &config.model_candidates {
        let marker = if chosen.as_ref() == Some(candidate) { "*" } else { " " };
        match local_ai_paths::file_size_gib(candidate) {
            Some(gib) => println!(" {} {} ({:.2} GiB)", marker, candidate.display(), gib),
            None => println!(" {} {} (missing)", marker, candidate.display()),
        }
    }
    if chosen.is_none() {
        println!();
        println!("No model file found. Run `bmo model pull` or pass --model.");
    }
    println!();

    println!("Server:");
    println!("  Binary: {}", config.server_binary.display());
    println!("  Exists: {}", config.server_binary.is_file());
    println!("  Port:   {}", config.server_port);
    println!();

    let manager = ModelManager::new();
    match manager.list_installed() {
        Ok(models) if models.is_empty() => println!("Installed models: none"),
        Ok(models) => println!("Installed models: {}", models.join(", ")),
        Err(e) => println!("Installed models: unavailable ({})", e),
    }

    Ok(())
}


/// Load the model the way `chat` does and run one tiny generation.
pub(crate) async fn load_test(service_args: &ServiceArgs) -> miette::Result<()> {
    println!();
    println!("Load test:");
    let service = service_args.start().await?;
    if let Some(model) = service.host().loaded_model() {
        println!("  Loaded:  {}", model.path.display());
        println!("  Warm-up: {:.2} tokens/s", model.warmup_tokens_per_second);
    }

    let params = GenerationParams::default()
        .with_max_tokens(5)
        .with_temperature(0.1);
    let result = service
        .host()
        .infer("Hello", &params)
        .await
        .map_err(|e| miette::miette!("Inference test failed: {}", e))?;
    println!("  Inference test: '{}' ({} tokens)", result.text, result.tokens_used);

    Ok(())
}
