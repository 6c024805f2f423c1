//! The `florence models` command for managing the model bundle.

use clap::{Args, Subcommand};
use florence_core::model::{ModelRegistry, OnnxModelLoader};
use florence_core::Config;

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download the generation graph and tokenizer
    Download {
        /// Download again even if the files are cached
        #[arg(long)]
        force: bool,
    },

    /// Show which bundle files are cached
    List,

    /// Show model directory path
    Path,
}

/// Files that still need fetching.
fn pending_files<'a>(registry: &ModelRegistry, files: &[&'a str], force: bool) -> Vec<&'a str> {
    files
        .iter()
        .copied()
        .filter(|file| force || !registry.is_cached(file))
        .collect()
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, mut config: Config) -> anyhow::Result<()> {
    // An explicit download always goes to the network.
    config.model.offline = false;
    let loader = OnnxModelLoader::from_config(&config);
    let registry = loader.registry();

    match args.command {
        ModelsCommand::Download { force } => {
            let files = loader.bundle_files();
            let pending = pending_files(registry, &files, force);

            for file in &files {
                if !pending.contains(file) {
                    tracing::info!("{} already exists at {:?}", file, registry.local_path(file));
                }
            }

            for file in pending {
                let file = file.to_string();
                let registry = registry.clone();
                tokio::task::spawn_blocking(move || registry.fetch(&file)).await??;
            }

            if let Some(graph) = loader.local_generator() {
                if !graph.is_file() {
                    tracing::warn!(
                        "Generation graph {:?} is not on disk; export it before captioning",
                        graph
                    );
                }
            }

            tracing::info!("All downloads complete.");
        }

        ModelsCommand::List => {
            println!("Model: {}", registry.repo());
            println!("  Directory: {}\n", registry.repo_dir().display());

            let files = loader.bundle_files();
            for file in &files {
                let status = if registry.is_cached(file) {
                    "ready"
                } else {
                    "not installed"
                };
                println!("    - {:40} {}", file, status);
            }

            let graph_ready = match loader.local_generator() {
                Some(graph) => {
                    let ready = graph.is_file();
                    let status = if ready { "ready" } else { "not exported" };
                    println!("    - {:40} {}", graph.display(), status);
                    ready
                }
                None => true,
            };

            if !files.iter().all(|f| registry.is_cached(f)) {
                println!("\nRun `florence models download` to fetch missing files.");
            }
            if !graph_ready {
                println!("Export the beam search graph and set `[model] generator` to its path.");
            }
        }

        ModelsCommand::Path => {
            println!("{}", config.model_dir().display());
        }
    }

    Ok(())
}
