//! Florence CLI - caption image datasets with Florence-2.
//!
//! Each image gets a detailed Florence-2 caption, cleaned into a short comma
//! separated phrase list and written next to the image as a `.txt` file.
//!
//! # Usage
//!
//! ```bash
//! # Caption a single image
//! florence caption cat.png
//!
//! # Caption a dataset folder, keeping existing captions
//! florence caption ./datasets/portraits --format jsonl -o captions.jsonl
//!
//! # Prefetch the model bundle
//! florence models download
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Florence - Florence-2 image captioning for training datasets.
#[derive(Parser, Debug)]
#[command(name = "florence")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Caption an image or every image in a dataset folder
    Caption(cli::caption::CaptionArgs),

    /// Manage the Florence-2 model bundle
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't up yet, so config problems go straight to stderr.
    let config = match florence_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `florence config path`."
            );
            florence_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Florence v{}", florence_core::VERSION);

    match cli.command {
        Commands::Caption(args) => cli::caption::execute(args, config).await,
        Commands::Models(args) => cli::models::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
