use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use extension_recommender::Config;

mod cli;

use cli::commands;

/// The main CLI command line interface.
#[derive(Parser)]
#[command(name = "recommender")]
#[command(version)]
#[command(about = "Inspect the shared extension recommendation store")]
#[command(long_about = "Extensions register cross-recommendations into a model shared\n\
    through a machine-local directory. This tool shows what is stored\n\
    there and can clear a lock left behind by a crashed writer.")]
#[command(after_help = "EXAMPLES:\n    \
    recommender status               Show store and lock state\n    \
    recommender list                 List stored recommendations\n    \
    recommender list --format json   Machine-readable listing\n    \
    recommender unlock               Remove a lock whose holder is gone\n\n\
    For more information about a command, run 'recommender <command> --help'.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backing directory (defaults to EXT_RECOMMENDER_DIR or the platform data dir)
    #[arg(short, long, global = true, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Show store location, lock holder, and model summary
    Status,

    /// List stored recommendations
    List(commands::list::Args),

    /// Remove a stuck lock marker
    #[command(long_about = "Removes the lock marker from the backing directory. Without\n\
        --force the marker is only removed when the process that took it\n\
        is no longer running.")]
    Unlock(commands::unlock::Args),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "extension_recommender=debug"
    } else {
        "extension_recommender=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let config = Config::from_env_with_dir(cli.dir)?;

    match cli.command {
        Commands::Status => commands::status::run(&config),
        Commands::List(args) => commands::list::run(args, &config),
        Commands::Unlock(args) => commands::unlock::run(args, &config),
    }
}
