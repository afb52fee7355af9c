//! Indexer (C9): `Fetcher -> Chunker -> Embedder -> CompositeStorage`.
//!
//! Grounded in the teacher's `LocalBackend::index` for the partition-by-
//! partition progress-logging shape and the `force`-gated re-index check,
//! generalized from "walk the graph's partitions" to "walk the repository's
//! chunked blocks".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use semindex_core::{
    BlockId, Chunker, ChunkerConfig, CodeBlock, FetchConfig, Fetcher, IndexLifecycle,
    RepositoryIndex, SourceKind, TreeSitterSource,
};
use semindex_search::EmbeddingProvider;
use semindex_storage::CompositeStorage;
use tracing::{info, warn};

use crate::error::BackendError;

/// Tunables for one [`Indexer`].
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub embedding_batch_size: usize,
    pub max_embedding_retries: u32,
    pub chunker: ChunkerConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            embedding_batch_size: 64,
            max_embedding_retries: 2,
            chunker: ChunkerConfig::default(),
        }
    }
}

/// Progress pushed after each file and after each embedding batch.
#[derive(Debug, Clone)]
pub struct IndexProgress {
    pub total_files: u64,
    pub processed_files: u64,
    pub total_blocks: u64,
    pub processed_blocks: u64,
    pub current_file: Option<String>,
    pub elapsed: Duration,
    pub errors_count: u64,
}

pub type ProgressCallback = Box<dyn Fn(IndexProgress) + Send>;

/// Outcome of one `index_repository` run.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub file_count: u64,
    pub block_count: u64,
    pub byte_count: u64,
    pub language_distribution: HashMap<String, u64>,
    pub errors_count: u64,
    pub lifecycle: IndexLifecycle,
}

/// Orchestrates fetch -> chunk -> batch-embed -> persist for one repository.
pub struct Indexer {
    fetcher: Fetcher,
    embedder: Arc<dyn EmbeddingProvider>,
    storage: Arc<CompositeStorage>,
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(
        fetcher: Fetcher,
        embedder: Arc<dyn EmbeddingProvider>,
        storage: Arc<CompositeStorage>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            fetcher,
            embedder,
            storage,
            config,
        }
    }

    /// Indexes `repository_id`. Idempotent on unchanged blocks: a block
    /// whose content-addressed id already exists in the store is skipped for
    /// both re-embedding and vector overwrite.
    pub async fn index_repository(
        &self,
        repository_id: &str,
        fetch_config: FetchConfig,
        now: i64,
        progress_cb: Option<ProgressCallback>,
    ) -> Result<IndexStats, BackendError> {
        let started = Instant::now();
        let source_kind = match &fetch_config {
            FetchConfig::Git { .. } => SourceKind::Git,
            FetchConfig::Local { .. } => SourceKind::Local,
            FetchConfig::Archive { .. } => SourceKind::Archive,
        };
        let location = fetch_location(&fetch_config);

        let mut manifest = self
            .storage
            .metadata
            .get_repository_index(repository_id)
            .unwrap_or_else(|| RepositoryIndex::new(repository_id, source_kind.clone(), location.clone()));
        manifest.lifecycle = IndexLifecycle::Indexing;
        self.storage.metadata.save_repository_index(manifest.clone())?;

        let result = self
            .run_pipeline(repository_id, &fetch_config, now, started, progress_cb)
            .await;

        match result {
            Ok(stats) => {
                manifest.lifecycle = IndexLifecycle::Indexed;
                manifest.indexed_at = Some(now);
                manifest.file_count = stats.file_count;
                manifest.block_count = stats.block_count;
                manifest.byte_count = stats.byte_count;
                manifest.language_distribution = stats.language_distribution.clone();
                self.storage.metadata.save_repository_index(manifest)?;
                info!(repository_id, blocks = stats.block_count, errors = stats.errors_count, "indexing finished");
                Ok(stats)
            }
            Err(err) => {
                manifest.lifecycle = IndexLifecycle::Failed;
                self.storage.metadata.save_repository_index(manifest)?;
                warn!(repository_id, error = %err, "indexing failed");
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        repository_id: &str,
        fetch_config: &FetchConfig,
        now: i64,
        started: Instant,
        progress_cb: Option<ProgressCallback>,
    ) -> Result<IndexStats, BackendError> {
        let tree = self.fetcher.fetch(fetch_config)?;

        let chunker = Chunker::new(Box::new(TreeSitterSource)).with_config(self.config.chunker.clone());
        let chunk_result = chunker.chunk_repository(tree.path(), repository_id, now);

        let mut errors_count = chunk_result.errors.len() as u64;
        for (path, err) in &chunk_result.errors {
            warn!(path = %path.display(), error = %err, "chunk error, file skipped");
        }

        let total_blocks = chunk_result.blocks.len() as u64;
        let mut byte_count = 0u64;
        let mut language_distribution: HashMap<String, u64> = HashMap::new();
        let mut file_paths = std::collections::HashSet::new();
        for block in &chunk_result.blocks {
            byte_count += block.content.len() as u64;
            file_paths.insert(block.file_path.clone());
            if let Some(language) = &block.language {
                *language_distribution.entry(language.clone()).or_insert(0) += 1;
            }
        }
        let total_files = file_paths.len() as u64;

        let (new_blocks, unchanged) = self.partition_by_existing(chunk_result.blocks)?;

        let mut processed_blocks = unchanged as u64;
        let mut processed_files = 0u64;
        let mut last_file = None;

        for batch in new_blocks.chunks(self.config.embedding_batch_size) {
            let texts: Vec<String> = batch.iter().map(|b| b.search_text.clone()).collect();
            let vectors = self.embed_with_retry(texts).await;

            for (block, vector) in batch.iter().zip(vectors.into_iter()) {
                if vector.is_none() {
                    errors_count += 1;
                }
                self.storage
                    .save_block_with_vector(block.clone(), vector)
                    .await?;
                processed_blocks += 1;
                if file_paths.remove(&block.file_path) {
                    processed_files += 1;
                    last_file = Some(block.file_path.clone());
                }
            }

            if let Some(cb) = &progress_cb {
                cb(IndexProgress {
                    total_files,
                    processed_files,
                    total_blocks,
                    processed_blocks,
                    current_file: last_file.clone(),
                    elapsed: started.elapsed(),
                    errors_count,
                });
            }
        }

        Ok(IndexStats {
            file_count: total_files,
            block_count: total_blocks,
            byte_count,
            language_distribution,
            errors_count,
            lifecycle: IndexLifecycle::Indexed,
        })
    }

    /// Splits freshly chunked blocks into those not yet persisted (need
    /// embedding) and a count of those whose `block_id` already exists
    /// (content-hash-identical, nothing to do).
    fn partition_by_existing(&self, blocks: Vec<CodeBlock>) -> Result<(Vec<CodeBlock>, usize), BackendError> {
        let mut new_blocks = Vec::with_capacity(blocks.len());
        let mut unchanged = 0usize;
        for block in blocks {
            if self.block_unchanged(&block.block_id)? {
                unchanged += 1;
            } else {
                new_blocks.push(block);
            }
        }
        Ok((new_blocks, unchanged))
    }

    fn block_unchanged(&self, block_id: &BlockId) -> Result<bool, BackendError> {
        Ok(self.storage.get_block(block_id)?.is_some())
    }

    /// Calls the provider once; on error, retries up to
    /// `max_embedding_retries` additional times. Blocks that still fail are
    /// returned as `None` so the caller persists them with
    /// `embedding_missing` rather than dropping the block entirely.
    async fn embed_with_retry(&self, texts: Vec<String>) -> Vec<Option<Vec<f32>>> {
        if texts.is_empty() {
            return Vec::new();
        }
        let count = texts.len();
        for attempt in 0..=self.config.max_embedding_retries {
            match self.embedder.embed(texts.clone()).await {
                Ok(vectors) => return vectors.into_iter().map(Some).collect(),
                Err(err) => {
                    warn!(attempt, error = %err, "embedding batch failed");
                }
            }
        }
        vec![None; count]
    }
}

fn fetch_location(config: &FetchConfig) -> String {
    match config {
        FetchConfig::Git { url, .. } => url.clone(),
        FetchConfig::Local { path } => path.display().to_string(),
        FetchConfig::Archive { path } => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use semindex_search::{EmbeddingError, InMemoryVectorStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        dim: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0; self.dim]).collect())
        }

        fn embedding_dim(&self) -> usize {
            self.dim
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }
    }

    struct AlwaysFailsProvider;

    #[async_trait]
    impl EmbeddingProvider for AlwaysFailsProvider {
        async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::ProviderUnavailable("down".into()))
        }

        fn embedding_dim(&self) -> usize {
            8
        }

        fn provider_name(&self) -> &str {
            "always-fails"
        }
    }

    fn setup(embedder: Arc<dyn EmbeddingProvider>) -> (tempfile::TempDir, Indexer) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            CompositeStorage::open(dir.path().join("storage"), Arc::new(InMemoryVectorStore::new())).unwrap(),
        );
        let fetcher = Fetcher::new(dir.path().join("work"));
        let indexer = Indexer::new(fetcher, embedder, storage, IndexerConfig::default());
        (dir, indexer)
    }

    #[tokio::test]
    async fn indexes_a_small_repository_and_marks_it_indexed() {
        let (dir, indexer) = setup(Arc::new(FixedProvider { dim: 4, calls: AtomicUsize::new(0) }));
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir_all(&repo_dir).unwrap();
        std::fs::write(repo_dir.join("lib.rs"), "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n").unwrap();

        let stats = indexer
            .index_repository("repo1", FetchConfig::Local { path: repo_dir }, 1000, None)
            .await
            .unwrap();

        assert_eq!(stats.lifecycle, IndexLifecycle::Indexed);
        assert!(stats.block_count >= 2);
        assert_eq!(stats.errors_count, 0);

        let manifest = indexer.storage.metadata.get_repository_index("repo1").unwrap();
        assert_eq!(manifest.lifecycle, IndexLifecycle::Indexed);
    }

    #[tokio::test]
    async fn reindexing_unchanged_repository_skips_reembedding() {
        let provider = Arc::new(FixedProvider { dim: 4, calls: AtomicUsize::new(0) });
        let (dir, indexer) = setup(provider.clone() as Arc<dyn EmbeddingProvider>);
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir_all(&repo_dir).unwrap();
        std::fs::write(repo_dir.join("lib.rs"), "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n").unwrap();

        indexer
            .index_repository("repo1", FetchConfig::Local { path: repo_dir.clone() }, 1000, None)
            .await
            .unwrap();
        let calls_after_first_run = provider.calls.load(Ordering::SeqCst);

        let stats = indexer
            .index_repository("repo1", FetchConfig::Local { path: repo_dir }, 2000, None)
            .await
            .unwrap();

        assert_eq!(stats.errors_count, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls_after_first_run);
    }

    #[tokio::test]
    async fn embedding_failures_persist_blocks_with_embedding_missing_not_fatal() {
        let (dir, indexer) = setup(Arc::new(AlwaysFailsProvider));
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir_all(&repo_dir).unwrap();
        std::fs::write(repo_dir.join("lib.rs"), "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n").unwrap();

        let stats = indexer
            .index_repository("repo1", FetchConfig::Local { path: repo_dir }, 1000, None)
            .await
            .unwrap();

        assert_eq!(stats.lifecycle, IndexLifecycle::Indexed);
        assert!(stats.errors_count > 0);
    }
}
