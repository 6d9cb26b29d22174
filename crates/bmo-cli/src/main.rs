//! BMO CLI - run and inspect the local BMO chat service.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::ServiceArgs;

/// BMO - a local chat companion backed by llama.cpp
#[derive(Parser)]
#[command(name = "bmo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the model and chat interactively
    Chat {
        #[command(flatten)]
        service: ServiceArgs,
        /// Conversation to talk in
        #[arg(long, default_value = "default")]
        session: String,
        /// Maximum tokens per reply (1-500)
        #[arg(long, default_value_t = 150)]
        max_tokens: u32,
        /// Sampling temperature (0.0-1.5)
        #[arg(long, default_value_t = 0.8)]
        temperature: f32,
    },

    /// Load the model, answer one prompt, print the reply as JSON
    Ask {
        #[command(flatten)]
        service: ServiceArgs,
        /// Message for BMO
        prompt: String,
        /// Maximum tokens for the reply (1-500)
        #[arg(long, default_value_t = 150)]
        max_tokens: u32,
        /// Sampling temperature (0.0-1.5)
        #[arg(long, default_value_t = 0.8)]
        temperature: f32,
    },

    /// Manage model files
    Model {
        #[command(subcommand)]
        command: ModelCommands,
    },

    /// Check memory, model files, host profile and inference settings
    Diagnose {
        #[command(flatten)]
        service: ServiceArgs,
        /// Also load the model and run one short generation
        #[arg(long)]
        load: bool,
    },

    /// Show information about the BMO installation
    Info,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// List installed models
    List,
    /// Download the default model, or install one from a local file
    Pull {
        /// Local .gguf file to install instead of downloading
        path: Option<PathBuf>,
        /// Download the smaller Q3_K_M quantisation
        #[arg(long)]
        small: bool,
    },
    /// Delete an installed model
    Remove {
        /// Name as shown by `bmo model list`
        name: String,
    },
    /// Show model directories and defaults
    Info,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,bmo_core=info,bmo_local_ai=info"))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    match cli.command {
        Commands::Info => commands::info::run(),
        Commands::Diagnose { service, load } => {
            commands::diagnose::run(&service)?;
            if load {
                runtime()?.block_on(commands::diagnose::load_test(&service))?;
            }
            Ok(())
        }
        Commands::Model { command } => match command {
            ModelCommands::List => commands::model::list(),
            ModelCommands::Info => commands::model::info(),
            ModelCommands::Remove { name } => commands::model::remove(&name),
            ModelCommands::Pull { path, small } => {
                runtime()?.block_on(commands::model::pull(path.as_deref(), small))
            }
        },
        Commands::Chat {
            service,
            session,
            max_tokens,
            temperature,
        } => runtime()?.block_on(commands::chat::run(
            &service,
            &session,
            max_tokens,
            temperature,
        )),
        Commands::Ask {
            service,
            prompt,
            max_tokens,
            temperature,
        } => runtime()?.block_on(commands::ask::run(&service, &prompt, max_tokens, temperature)),
    }
}

fn runtime() -> miette::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| miette::miette!("Failed to start runtime: {}", e))
}
