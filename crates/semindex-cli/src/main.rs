//! semindex CLI - fetch, chunk, embed, and search source repositories.
//!
//! # Usage
//!
//! ```bash
//! # Scaffold a workspace's local config
//! semindex init
//!
//! # Index a local path or a git URL
//! semindex index .
//! semindex index https://github.com/example/repo.git
//!
//! # Search the index
//! semindex search "authentication logic"
//!
//! # Inspect indexed repositories
//! semindex status
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod progress;

/// semindex - semantic code search and indexing
#[derive(Parser, Debug)]
#[command(name = "semindex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Options available to every subcommand.
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Workspace to operate on (defaults to the current directory).
    #[arg(long, short = 'w', global = true, env = "SEMINDEX_WORKSPACE")]
    workspace: Option<String>,

    /// Enable verbose output.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output.
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scaffold a workspace's local configuration file.
    Init(commands::init::InitArgs),

    /// Fetch, chunk, embed, and persist a repository.
    Index(commands::index::IndexArgs),

    /// Search the index semantically or by code fragment.
    Search(commands::search::SearchArgs),

    /// Show indexed repositories and their manifests.
    Status(commands::status::StatusArgs),

    /// Remove a repository's blocks, vectors, and manifest.
    Clean(commands::clean::CleanArgs),

    /// View the resolved configuration.
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.global.quiet {
        Level::ERROR
    } else if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.global).await,
        Commands::Index(args) => commands::index::execute(args, cli.global).await,
        Commands::Search(args) => commands::search::execute(args, cli.global).await,
        Commands::Status(args) => commands::status::execute(args, cli.global).await,
        Commands::Clean(args) => commands::clean::execute(args, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
    }
}
