//! Init command - scaffold a workspace's local configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use semindex_config::ConfigLoader;

use super::print_info;
use crate::GlobalOptions;

/// Arguments for the init command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path to initialize (defaults to the current directory).
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Overwrite an existing local config file.
    #[arg(long, short = 'f')]
    force: bool,
}

/// Executes the init command.
pub async fn execute(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let workspace_path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()?.join(&args.path)
    };
    let workspace_path = workspace_path.canonicalize().context("failed to resolve workspace path")?;

    let loader = ConfigLoader::new();
    let local_config_path = loader.local_config_path(&workspace_path);

    if local_config_path.exists() && !args.force {
        anyhow::bail!(
            "local config already exists at {} (use --force to overwrite)",
            local_config_path.display()
        );
    }

    let config_path = loader.init_local(&workspace_path).context("failed to write local config")?;
    print_info(&format!("Created {}", config_path.display()), global.quiet);

    if !global.quiet {
        println!("\nWorkspace ready at {}", workspace_path.display());
        println!("\nNext steps:");
        println!("  semindex index .                  - Index this workspace");
        println!("  semindex search \"your query\"       - Search the index");
        println!("  semindex status                   - Check index status");
    }

    Ok(())
}
