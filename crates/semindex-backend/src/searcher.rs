//! Searcher (C10): query validation, embedding, candidate retrieval,
//! residual filtering, and ranking.

use std::collections::HashMap;
use std::sync::Arc;

use semindex_core::{BlockId, BlockType, CodeBlock, MatchReason, MetadataFilters, SearchQuery, SearchResult};
use semindex_search::{EmbeddingProvider, VectorMetadata};
use semindex_storage::CompositeStorage;
use tracing::warn;

use crate::error::BackendError;

/// Residual, in-process filters applied after vector-store candidates are
/// hydrated into blocks (spec step 6).
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub repository_id: Option<String>,
    pub language: Option<String>,
    pub block_type: Option<BlockType>,
    pub file_path_substring: Option<String>,
    pub metadata_filters: MetadataFilters,
    pub time_window: Option<(i64, i64)>,
}

pub struct Searcher {
    embedder: Arc<dyn EmbeddingProvider>,
    storage: Arc<CompositeStorage>,
}

impl Searcher {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, storage: Arc<CompositeStorage>) -> Self {
        Self { embedder, storage }
    }

    /// The eight-step pipeline: validate, persist query, embed, retrieve
    /// candidates, hydrate, filter, threshold, rank.
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        filters: SearchFilters,
        similarity_threshold: f32,
        now: i64,
    ) -> Result<Vec<SearchResult>, BackendError> {
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        if top_k == 0 {
            return Err(BackendError::InvalidQuery("top_k must be >= 1".into()));
        }
        if !(-1.0..=1.0).contains(&similarity_threshold) {
            return Err(BackendError::InvalidQuery(
                "similarity_threshold must be in [-1, 1]".into(),
            ));
        }

        let mut query_record = SearchQuery::new(query_text, top_k, now);
        query_record.repository_id = filters.repository_id.clone();
        query_record.language = filters.language.clone();
        query_record.block_type = filters.block_type;
        query_record.file_path_substring = filters.file_path_substring.clone();
        query_record.metadata_filters = filters.metadata_filters.clone();
        query_record.time_window = filters.time_window;
        query_record.similarity_threshold = similarity_threshold;
        if let Err(err) = self.storage.metadata.save_search_query(query_record) {
            warn!(error = %err, "failed to persist search history, continuing");
        }

        let query_vector = match self.embedder.embed(vec![query_text.to_string()]).await {
            Ok(mut embeddings) if !embeddings.is_empty() => embeddings.remove(0),
            Ok(_) => return Ok(Vec::new()),
            Err(err) => {
                warn!(error = %err, "query embedding failed, returning no results");
                return Ok(Vec::new());
            }
        };

        let pushdown_filter = pushdown_metadata(&filters);
        let requested = (top_k * 2).max(top_k + 10);
        let hits = match self
            .storage
            .vectors
            .search_filtered(&query_vector, requested, pushdown_filter.as_ref())
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                warn!(error = %err, "vector search failed, returning no results");
                return Ok(Vec::new());
            }
        };

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let block_id = BlockId(hit.id.clone());
            let block = match self.storage.get_block(&block_id) {
                Ok(Some(block)) => block,
                Ok(None) => {
                    warn!(block_id = %block_id, "vector hit has no matching block, dropping");
                    continue;
                }
                Err(err) => {
                    warn!(block_id = %block_id, error = %err, "failed to hydrate block, dropping");
                    continue;
                }
            };
            if !matches_residual_filters(&block, &filters) {
                continue;
            }
            if hit.score < similarity_threshold {
                continue;
            }
            results.push(SearchResult {
                block,
                score: hit.score,
                match_reason: MatchReason::VectorSimilarity,
            });
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.block.block_id.cmp(&b.block.block_id))
        });
        results.truncate(top_k);
        Ok(results)
    }

    /// `search` with the query text being a code snippet rather than prose.
    pub async fn search_by_code(
        &self,
        snippet: &str,
        top_k: usize,
        filters: SearchFilters,
        similarity_threshold: f32,
        now: i64,
    ) -> Result<Vec<SearchResult>, BackendError> {
        self.search(snippet, top_k, filters, similarity_threshold, now).await
    }

    /// `search` forced to `block_type = function`.
    pub async fn search_similar_functions(
        &self,
        name: &str,
        top_k: usize,
        mut filters: SearchFilters,
        similarity_threshold: f32,
        now: i64,
    ) -> Result<Vec<SearchResult>, BackendError> {
        filters.block_type = Some(BlockType::Function);
        self.search(name, top_k, filters, similarity_threshold, now).await
    }

    /// Recommends blocks related to `file_path`: runs a search per one of
    /// the file's first three blocks at `similarity_threshold = 0.3`,
    /// excludes same-file hits, dedupes by `block_id` keeping the max score.
    pub async fn get_recommendations(
        &self,
        file_path: &str,
        top_k: usize,
        repository_id: Option<String>,
        now: i64,
    ) -> Result<Vec<SearchResult>, BackendError> {
        let filter = semindex_storage::BlockQuery {
            repository_id: repository_id.clone(),
            file_path_substring: Some(file_path.to_string()),
            ..Default::default()
        };
        let seed_blocks = match self.storage.blocks.query(&filter, 3, 0) {
            Ok(blocks) => blocks,
            Err(err) => {
                warn!(file_path, error = %err, "failed to load seed blocks, returning no recommendations");
                return Ok(Vec::new());
            }
        };
        if seed_blocks.is_empty() {
            return Ok(Vec::new());
        }

        let mut best: HashMap<BlockId, SearchResult> = HashMap::new();
        for seed in &seed_blocks {
            let filters = SearchFilters {
                repository_id: repository_id.clone(),
                ..Default::default()
            };
            let hits = self
                .search(&seed.search_text, top_k.max(5), filters, 0.3, now)
                .await?;
            for hit in hits {
                if hit.block.file_path == file_path {
                    continue;
                }
                match best.get(&hit.block.block_id) {
                    Some(existing) if existing.score >= hit.score => {}
                    _ => {
                        best.insert(hit.block.block_id.clone(), hit);
                    }
                }
            }
        }

        let mut merged: Vec<SearchResult> = best.into_values().collect();
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.block.block_id.cmp(&b.block.block_id))
        });
        merged.truncate(top_k);
        for result in &mut merged {
            result.match_reason = MatchReason::Recommendation;
        }
        Ok(merged)
    }
}

fn pushdown_metadata(filters: &SearchFilters) -> Option<VectorMetadata> {
    let mut metadata: VectorMetadata = HashMap::new();
    if let Some(repository_id) = &filters.repository_id {
        metadata.insert("repository_id".to_string(), serde_json::json!(repository_id));
    }
    if let Some(block_type) = &filters.block_type {
        metadata.insert("block_type".to_string(), serde_json::json!(block_type.as_str()));
    }
    if metadata.is_empty() {
        None
    } else {
        Some(metadata)
    }
}

fn matches_residual_filters(block: &CodeBlock, filters: &SearchFilters) -> bool {
    if let Some(repository_id) = &filters.repository_id {
        if &block.repository_id != repository_id {
            return false;
        }
    }
    if let Some(language) = &filters.language {
        if block.language.as_deref() != Some(language.as_str()) {
            return false;
        }
    }
    if let Some(block_type) = filters.block_type {
        if block.block_type != block_type {
            return false;
        }
    }
    if let Some(substring) = &filters.file_path_substring {
        if !block.file_path.contains(substring.as_str()) {
            return false;
        }
    }
    for (key, expected) in &filters.metadata_filters {
        if block.metadata.get(key) != Some(expected) {
            return false;
        }
    }
    if let Some((start, end)) = filters.time_window {
        if block.created_at < start || block.created_at > end {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use semindex_core::ContentHash;
    use semindex_search::{EmbeddingError, InMemoryVectorStore};

    struct EchoProvider;

    #[async_trait]
    impl EmbeddingProvider for EchoProvider {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("needle") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }

        fn embedding_dim(&self) -> usize {
            2
        }

        fn provider_name(&self) -> &str {
            "echo"
        }
    }

    fn block(id: &str, repo: &str, file: &str, text: &str) -> CodeBlock {
        CodeBlock {
            block_id: BlockId(id.to_string()),
            repository_id: repo.to_string(),
            content: text.to_string(),
            content_hash: ContentHash::of(text),
            file_path: file.to_string(),
            line_start: 1,
            line_end: 1,
            char_start: None,
            char_end: None,
            block_type: BlockType::Function,
            language: Some("rust".to_string()),
            name: Some(text.to_string()),
            full_name: Some(text.to_string()),
            signature: None,
            class_name: None,
            namespace: None,
            keywords: Vec::new(),
            search_text: text.to_string(),
            parent_block_id: None,
            child_block_ids: Vec::new(),
            related_block_ids: Vec::new(),
            embedding: None,
            metadata: HashMap::new(),
            created_at: 1,
            updated_at: 1,
        }
    }

    async fn setup() -> (tempfile::TempDir, Searcher, Arc<CompositeStorage>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            CompositeStorage::open(dir.path(), Arc::new(InMemoryVectorStore::new())).unwrap(),
        );
        storage
            .save_block_with_vector(block("b1", "repo1", "src/a.rs", "needle function"), Some(vec![1.0, 0.0]))
            .await
            .unwrap();
        storage
            .save_block_with_vector(block("b2", "repo1", "src/b.rs", "unrelated function"), Some(vec![0.0, 1.0]))
            .await
            .unwrap();
        let searcher = Searcher::new(Arc::new(EchoProvider), storage.clone());
        (dir, searcher, storage)
    }

    #[tokio::test]
    async fn empty_query_returns_empty_result() {
        let (_dir, searcher, _storage) = setup().await;
        let results = searcher
            .search("", 10, SearchFilters::default(), -1.0, 1)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_ranks_closest_vector_first() {
        let (_dir, searcher, _storage) = setup().await;
        let results = searcher
            .search("needle query", 10, SearchFilters::default(), -1.0, 1)
            .await
            .unwrap();
        assert_eq!(results[0].block.block_id.as_str(), "b1");
    }

    #[tokio::test]
    async fn similarity_threshold_drops_low_scoring_candidates() {
        let (_dir, searcher, _storage) = setup().await;
        let results = searcher
            .search("needle query", 10, SearchFilters::default(), 0.99, 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].block.block_id.as_str(), "b1");
    }

    #[tokio::test]
    async fn invalid_top_k_is_rejected() {
        let (_dir, searcher, _storage) = setup().await;
        let err = searcher
            .search("needle", 0, SearchFilters::default(), -1.0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn recommendations_exclude_same_file_and_dedupe() {
        let (_dir, searcher, storage) = setup().await;
        storage
            .save_block_with_vector(block("b3", "repo1", "src/a.rs", "needle sibling"), Some(vec![1.0, 0.0]))
            .await
            .unwrap();

        let results = searcher
            .get_recommendations("src/a.rs", 10, Some("repo1".to_string()), 1)
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.block.file_path != "src/a.rs"));
    }
}
