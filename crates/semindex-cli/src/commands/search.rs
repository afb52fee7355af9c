//! Search command - semantic code search over an indexed workspace.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use semindex_backend::{SearchFilters, Searcher};
use semindex_core::BlockType;

use super::{build_embedder, build_storage, load_config, resolve_workspace};
use crate::GlobalOptions;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Natural-language or code-fragment query.
    query: String,

    /// Maximum number of results to return.
    #[arg(long, short = 'n', default_value = "10")]
    limit: usize,

    /// Minimum similarity score to keep a result.
    #[arg(long, default_value = "0.0")]
    min_score: f32,

    /// Restrict results to one repository.
    #[arg(long)]
    repository: Option<String>,

    /// Restrict results to one language (e.g. "python").
    #[arg(long)]
    language: Option<String>,

    /// Restrict results to one block type (file, class, function, method, block).
    #[arg(long)]
    block_type: Option<String>,

    /// Treat the query as a code snippet rather than natural language.
    #[arg(long)]
    code: bool,

    /// Output format.
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Executes the search command.
pub async fn execute(args: SearchArgs, global: GlobalOptions) -> Result<()> {
    let workspace = resolve_workspace(&global)?;
    let config = load_config(&global, &workspace)?;

    let storage = build_storage(&config, &workspace).await?;
    let embedder = build_embedder(&config)?;
    let searcher = Searcher::new(embedder, storage);

    let block_type = args
        .block_type
        .as_deref()
        .map(parse_block_type)
        .transpose()
        .context("invalid --block-type")?;

    let filters = SearchFilters {
        repository_id: args.repository.clone(),
        language: args.language.clone(),
        block_type,
        ..Default::default()
    };

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let results = if args.code {
        searcher.search_by_code(&args.query, args.limit, filters, args.min_score, now).await
    } else {
        searcher.search(&args.query, args.limit, filters, args.min_score, now).await
    }
    .context("search failed")?;

    if results.is_empty() {
        if !global.quiet {
            eprintln!("No results found for: {}", args.query);
        }
        return Ok(());
    }

    match args.output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&results).context("failed to serialize results")?;
            println!("{json}");
        }
        OutputFormat::Text => {
            if !global.quiet {
                println!("Found {} results for \"{}\":\n", results.len(), args.query);
            }
            for (i, result) in results.iter().enumerate() {
                let block = &result.block;
                let name = block.full_name.as_deref().or(block.name.as_deref()).unwrap_or("<unnamed>");
                println!("{}. {} ({})", i + 1, name, block.block_type.as_str());
                println!("   {}:{}-{}", block.file_path, block.line_start, block.line_end);
                println!("   score: {:.3}", result.score);
                println!();
            }
        }
    }

    Ok(())
}

fn parse_block_type(s: &str) -> Result<BlockType> {
    match s {
        "file" => Ok(BlockType::File),
        "module" => Ok(BlockType::Module),
        "class" => Ok(BlockType::Class),
        "function" => Ok(BlockType::Function),
        "method" => Ok(BlockType::Method),
        "block" => Ok(BlockType::Block),
        "comment" => Ok(BlockType::Comment),
        "import" => Ok(BlockType::Import),
        other => anyhow::bail!(
            "unknown block type '{other}', expected one of: file, module, class, function, method, block, comment, import"
        ),
    }
}
