//! Shared helpers for CLI command implementations: workspace/config
//! resolution and storage/indexer/searcher construction.

pub mod clean;
pub mod config;
pub mod index;
pub mod init;
pub mod search;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use semindex_config::{ConfigLoader, SemindexConfig, StorageBackend, VectorBackend};
use semindex_search::{EmbeddingProvider, OpenAIConfig, OpenAIProvider, QdrantConfig, QdrantVectorStore};
use semindex_search::{InMemoryVectorStore, VectorStore};
use semindex_storage::CompositeStorage;
use sha2::{Digest, Sha256};

use crate::GlobalOptions;

/// Resolves the workspace root: the `--workspace` flag if given (must
/// exist), otherwise the current directory.
pub fn resolve_workspace(global: &GlobalOptions) -> Result<PathBuf> {
    match &global.workspace {
        Some(path) => {
            let path = PathBuf::from(path);
            path.canonicalize().with_context(|| format!("workspace path '{}' does not exist", path.display()))
        }
        None => std::env::current_dir().context("failed to read current directory"),
    }
}

/// Loads the layered configuration for a workspace (global file -> local
/// file -> `SEMINDEX_*` env vars; the CLI itself adds no further layer).
pub fn load_config(_global: &GlobalOptions, workspace: &Path) -> Result<SemindexConfig> {
    let mut loader = ConfigLoader::new();
    loader.load(workspace, None).context("failed to load configuration")
}

/// Builds the embedding provider named by `config.embedding.provider_type`.
/// Only `openai` (which also covers OpenAI-compatible servers such as
/// Azure OpenAI or Ollama) is implemented.
pub fn build_embedder(config: &SemindexConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider_type.as_str() {
        "openai" => {
            let mut openai_config = OpenAIConfig::openai(config.embedding.api_key.clone().unwrap_or_default());
            if let Some(base_url) = &config.embedding.base_url {
                openai_config.base_url = base_url.clone();
            }
            openai_config.model = config.embedding.model_name.clone();
            openai_config.timeout_secs = config.embedding.timeout_secs;
            let provider = OpenAIProvider::new(openai_config).context("failed to build embedding provider")?;
            Ok(Arc::new(provider))
        }
        other => anyhow::bail!("unsupported embedding.provider_type '{other}'"),
    }
}

/// Builds the vector store named by `config.storage.vector_backend`.
pub async fn build_vector_store(config: &SemindexConfig) -> Result<Arc<dyn VectorStore>> {
    match config.storage.vector_backend {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        VectorBackend::AnnA => {
            let qdrant_config = QdrantConfig::new("http://localhost:6334", "semindex");
            let store = QdrantVectorStore::connect(qdrant_config)
                .await
                .context("failed to connect to Qdrant (storage.vector_backend = ann-a)")?;
            Ok(Arc::new(store))
        }
        VectorBackend::AnnB => {
            anyhow::bail!("storage.vector_backend = 'ann-b' has no backend implementation in this build")
        }
    }
}

/// Opens composite storage rooted at `config.storage.base_path`, resolved
/// relative to the workspace if it's a relative path.
pub async fn build_storage(config: &SemindexConfig, workspace: &Path) -> Result<Arc<CompositeStorage>> {
    let StorageBackend::Local = config.storage.storage_backend;
    let base_path = if config.storage.base_path.is_absolute() {
        config.storage.base_path.clone()
    } else {
        workspace.join(&config.storage.base_path)
    };
    let vectors = build_vector_store(config).await?;
    let storage = CompositeStorage::open(&base_path, vectors)
        .with_context(|| format!("failed to open storage at {}", base_path.display()))?;
    Ok(Arc::new(storage))
}

/// Computes a repository identity per the configured source: `hash(url,
/// branch, commit)` for git sources, `hash(canonical_path,
/// content_hash_of_tree)` for local/archive sources.
pub fn repository_id_for(fetch_config: &semindex_core::FetchConfig) -> Result<String> {
    use semindex_core::FetchConfig::*;

    let mut hasher = Sha256::new();
    match fetch_config {
        Git { url, branch, commit, .. } => {
            hasher.update(url.as_bytes());
            hasher.update(branch.as_deref().unwrap_or("").as_bytes());
            hasher.update(commit.as_deref().unwrap_or("").as_bytes());
        }
        Local { path } | Archive { path } => {
            let canonical = path.canonicalize().with_context(|| format!("cannot resolve path '{}'", path.display()))?;
            hasher.update(canonical.to_string_lossy().as_bytes());
            hasher.update(content_hash_of_tree(&canonical)?.as_bytes());
        }
    }
    Ok(hex::encode(hasher.finalize())[..16].to_string())
}

/// Hashes every regular file under `root` by relative path and content,
/// in sorted path order, so the result only changes when the tree does.
fn content_hash_of_tree(root: &Path) -> Result<String> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    let mut hasher = Sha256::new();
    for path in paths {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        hasher.update(relative.to_string_lossy().as_bytes());
        let content = std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        hasher.update(&content);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Prints a message to stderr unless `quiet` is set.
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{message}");
    }
}
