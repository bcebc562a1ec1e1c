//! pairsift CLI - filter image-caption pairs by image/phrase embedding agreement.
//!
//! pairsift reads an extracted webdataset directory (`<key>.jpg` images with
//! `<key>.txt` captions), extracts candidate phrases from every caption and
//! keeps the phrase the image agrees with most. Statistics and a table of
//! accepted pairs are written to a report directory as the run progresses.
//!
//! # Usage
//!
//! ```bash
//! # Score a dataset with the default model
//! pairsift run ./shard-00000/
//!
//! # Multilingual model on a GPU, stricter threshold
//! pairsift run ./shard-00000/ --model-type xlm_roberta_large_vit_l14 --device cuda:0 --threshold 0.35
//!
//! # View configuration
//! pairsift config show
//!
//! # Check which models are installed
//! pairsift models list
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// pairsift - score image-caption pairs with vision-language embeddings.
#[derive(Parser, Debug)]
#[command(name = "pairsift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "PAIRSIFT_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Score every image-caption pair in a dataset directory
    Run(cli::run::RunArgs),

    /// Inspect embedding models
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref().map(cli::expand_path);

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `pairsift config path`."
            );
            pairsift_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("pairsift v{}", pairsift_core::VERSION);

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, config_path.as_deref()).await,
        Commands::Models(args) => cli::models::execute(args, config_path.as_deref()).await,
        Commands::Config(args) => cli::config::execute(args, config_path.as_deref()).await,
    }
}
