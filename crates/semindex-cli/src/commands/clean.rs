//! Clean command - purge a repository's blocks, vectors, and manifest.

use anyhow::{Context, Result};
use clap::Args;

use super::{build_storage, load_config, print_info, resolve_workspace};
use crate::GlobalOptions;

/// Arguments for the clean command.
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Repository id to purge.
    repository_id: String,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    yes: bool,
}

/// Executes the clean command.
pub async fn execute(args: CleanArgs, global: GlobalOptions) -> Result<()> {
    if !args.yes && !global.quiet {
        eprint!("Purge all data for repository '{}'? [y/N] ", args.repository_id);
        use std::io::Write;
        std::io::stderr().flush().ok();
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer).context("failed to read confirmation")?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let workspace = resolve_workspace(&global)?;
    let config = load_config(&global, &workspace)?;
    let storage = build_storage(&config, &workspace).await?;

    let summary = storage.purge_repository(&args.repository_id).await.context("purge failed")?;

    print_info(
        &format!(
            "Purged repository '{}': {} blocks, {} vectors, manifest removed: {}",
            args.repository_id, summary.deleted_blocks, summary.deleted_vectors, summary.deleted_manifest
        ),
        global.quiet,
    );

    Ok(())
}
