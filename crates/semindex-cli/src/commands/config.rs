//! Config command - view the resolved configuration and file locations.

use anyhow::Result;
use clap::Subcommand;
use semindex_config::ConfigLoader;

use super::{load_config, resolve_workspace};
use crate::GlobalOptions;

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully resolved configuration.
    Show,

    /// Print the global and local config file paths.
    Path,
}

/// Executes a config subcommand.
pub async fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let workspace = resolve_workspace(&global)?;
            let config = load_config(&global, &workspace)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigCommand::Path => {
            let workspace = resolve_workspace(&global)?;
            let loader = ConfigLoader::new();
            if let Some(global_path) = loader.global_config_path() {
                println!("global: {}", global_path.display());
            } else {
                println!("global: <no home directory>");
            }
            println!("local:  {}", loader.local_config_path(&workspace).display());
            Ok(())
        }
    }
}
