//! Info command - show information about the BMO installation.

use bmo_core::{local_ai_paths, DEFAULT_LOCAL_AI_PORT, DEFAULT_MODEL_FILENAME};

pub(crate) fn run() -> miette::Result<()> {
    println!("BMO");
    println!("===");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Components:");
    println!("  bmo-local-ai - llama-server process, HTTP client, model files");
    println!("  bmo-core     - conversations, mood, generation gate, chat service");
    println!("  bmo-cli      - this binary");
    println!();

    println!("Model:");
    println!("  Default file: {}", DEFAULT_MODEL_FILENAME);
    println!("  Models dir:   {}", local_ai_paths::models_dir().display());
    println!("  Server port:  {}", DEFAULT_LOCAL_AI_PORT);
    println!();

    println!("Environment:");
    for var in [
        "BMO_MODEL_PATH",
        "BMO_MAX_HISTORY",
        "BMO_CONTEXT_TURNS",
        "BMO_MAX_TOKENS_CAP",
        "BMO_PORT",
        "BMO_SERVER_BIN",
        "BMO_WARMUP_MIN_TPS",
    ] {
        match std::env::var(var) {
            Ok(value) => println!("  {:<20} {}", var, value),
            Err(_) => println!("  {:<20} (unset)", var),
        }
    }

    Ok(())
}
