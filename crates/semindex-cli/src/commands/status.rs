//! Status command - show indexed repositories and their manifests.

use anyhow::Result;
use clap::Args;

use super::{build_storage, load_config, resolve_workspace};
use crate::GlobalOptions;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show only one repository's manifest.
    #[arg(long)]
    repository: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    json: bool,
}

/// Executes the status command.
pub async fn execute(args: StatusArgs, global: GlobalOptions) -> Result<()> {
    let workspace = resolve_workspace(&global)?;
    let config = load_config(&global, &workspace)?;
    let storage = build_storage(&config, &workspace).await?;

    let mut manifests = storage.metadata.list_repository_indexes();
    if let Some(ref repository_id) = args.repository {
        manifests.retain(|m| &m.repository_id == repository_id);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifests)?);
        return Ok(());
    }

    if manifests.is_empty() {
        println!("No repositories indexed yet. Run 'semindex index <path>' to get started.");
        return Ok(());
    }

    println!("Indexed repositories:\n");
    for manifest in &manifests {
        println!("{}", manifest.repository_id);
        println!("  source:     {:?} ({})", manifest.source_kind, manifest.location);
        println!("  lifecycle:  {:?}", manifest.lifecycle);
        println!("  files:      {}", manifest.file_count);
        println!("  blocks:     {}", manifest.block_count);
        if let Some(indexed_at) = manifest.indexed_at {
            println!("  indexed_at: {indexed_at}");
        }
        if global.verbose && !manifest.language_distribution.is_empty() {
            println!("  languages:");
            for (language, count) in &manifest.language_distribution {
                println!("    {language}: {count}");
            }
        }
        println!();
    }

    Ok(())
}
