//! Index command - fetch, chunk, embed, and persist a repository.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use semindex_backend::{IndexerConfig, Indexer};
use semindex_core::{FetchConfig, Fetcher};

use super::{build_embedder, build_storage, load_config, print_info, repository_id_for, resolve_workspace};
use crate::progress::{finish_spinner, finish_spinner_warn, spinner};
use crate::GlobalOptions;

/// Arguments for the index command.
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Local path or git URL to index. Defaults to the resolved workspace.
    source: Option<String>,

    /// Git branch to check out (only meaningful for a git URL).
    #[arg(long)]
    branch: Option<String>,

    /// Git commit to pin (only meaningful for a git URL).
    #[arg(long)]
    commit: Option<String>,

    /// Override the repository id instead of deriving one.
    #[arg(long)]
    repository_id: Option<String>,
}

/// Executes the index command.
pub async fn execute(args: IndexArgs, global: GlobalOptions) -> Result<()> {
    let workspace = resolve_workspace(&global)?;
    let config = load_config(&global, &workspace)?;

    let fetch_config = match &args.source {
        Some(source) if source.starts_with("http://") || source.starts_with("https://") || source.ends_with(".git") => {
            FetchConfig::Git {
                url: source.clone(),
                branch: args.branch.clone(),
                commit: args.commit.clone(),
                auth_token: std::env::var("SEMINDEX_GIT_TOKEN").ok(),
            }
        }
        Some(source) => FetchConfig::Local { path: PathBuf::from(source) },
        None => FetchConfig::Local { path: workspace.clone() },
    };

    let repository_id = match args.repository_id {
        Some(id) => id,
        None => repository_id_for(&fetch_config)?,
    };

    let storage = build_storage(&config, &workspace).await?;
    let embedder = build_embedder(&config)?;
    let fetcher = Fetcher::new(std::env::temp_dir().join("semindex-fetch"));
    let indexer = Indexer::new(fetcher, embedder, Arc::clone(&storage), IndexerConfig::default());

    print_info(&format!("Indexing repository '{repository_id}'..."), global.quiet);
    let pb = spinner("Fetching, chunking, and embedding...", global.quiet);

    let now = chrono_now();
    let result = indexer.index_repository(&repository_id, fetch_config, now, None).await;

    match result {
        Ok(stats) => {
            finish_spinner(
                pb,
                &format!("Indexed {} blocks across {} files", stats.block_count, stats.file_count),
            );
            if !global.quiet {
                println!("\nrepository_id: {repository_id}");
                println!("lifecycle:     {:?}", stats.lifecycle);
                println!("files:         {}", stats.file_count);
                println!("blocks:        {}", stats.block_count);
                println!("bytes:         {}", stats.byte_count);
                println!("errors:        {}", stats.errors_count);
                if global.verbose && !stats.language_distribution.is_empty() {
                    println!("\nlanguages:");
                    for (language, count) in &stats.language_distribution {
                        println!("  {language}: {count}");
                    }
                }
            }
            Ok(())
        }
        Err(err) => {
            finish_spinner_warn(pb, "Indexing failed");
            Err(err).context("indexing failed")
        }
    }
}

/// Current Unix time in seconds. Indexer timestamps are caller-supplied so
/// the pipeline stays deterministic and testable without wall-clock reads.
fn chrono_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
