//! Composite Storage (C8): one facade over the block store, vector store,
//! and metadata store.
//!
//! Grounded in the teacher's `LocalBackend` (facade-over-stores) and in the
//! original `composite_storage.py`'s `save_code_block_with_vector` /
//! `delete_repository_data` for the exact two-store-then-manifest ordering:
//! a crash mid-purge leaves orphan vectors (detectable, garbage-collectable)
//! but never a dangling block or manifest reference.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use semindex_core::{BlockId, CodeBlock};
use semindex_search::{VectorMetadata, VectorStore};
use serde_json::json;

use crate::block_store::{BlockQuery, CodeBlockStore};
use crate::error::CompositeStorageError;
use crate::metadata_store::MetadataStore;

/// Summary of a [`CompositeStorage::purge_repository`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgeSummary {
    pub deleted_blocks: u64,
    pub deleted_vectors: u64,
    pub deleted_manifest: bool,
}

/// Facade coordinating the code-block store (C5), vector store (C6), and
/// metadata store (C7) behind one interface.
pub struct CompositeStorage {
    pub blocks: CodeBlockStore,
    pub vectors: Arc<dyn VectorStore>,
    pub metadata: MetadataStore,
}

impl CompositeStorage {
    pub fn open(base_path: impl AsRef<Path>, vectors: Arc<dyn VectorStore>) -> Result<Self, CompositeStorageError> {
        let base_path = base_path.as_ref();
        Ok(Self {
            blocks: CodeBlockStore::open(base_path)?,
            vectors,
            metadata: MetadataStore::open(base_path)?,
        })
    }

    /// Writes the block first, then the vector with metadata
    /// `{repository_id, file_path, block_type, language, name}`. If the
    /// vector write fails, the block row is kept with `embedding_missing =
    /// true` so a later pass can retry; no vector is ever written without a
    /// corresponding block.
    pub async fn save_block_with_vector(
        &self,
        block: CodeBlock,
        vector: Option<Vec<f32>>,
    ) -> Result<(), CompositeStorageError> {
        self.blocks.save(&block)?;

        let Some(vector) = vector else {
            self.blocks.mark_embedding_missing(&block.block_id, true)?;
            return Ok(());
        };

        let metadata = vector_metadata(&block);
        match self
            .vectors
            .add(block.block_id.as_str().to_string(), vector, metadata)
            .await
        {
            Ok(()) => {
                self.blocks.mark_embedding_missing(&block.block_id, false)?;
                Ok(())
            }
            Err(e) => {
                self.blocks.mark_embedding_missing(&block.block_id, true)?;
                tracing::warn!(block_id = %block.block_id, error = %e, "vector write failed, marked embedding_missing");
                Ok(())
            }
        }
    }

    /// Cross-store delete. Enumerates block ids from C5, deletes the
    /// matching vectors from C6, deletes the blocks from C5, then deletes
    /// the manifest entry from C7 -- in that order, so a crash leaves at
    /// worst orphan vectors, never orphan block/manifest references.
    pub async fn purge_repository(&self, repository_id: &str) -> Result<PurgeSummary, CompositeStorageError> {
        let filter = BlockQuery {
            repository_id: Some(repository_id.to_string()),
            ..Default::default()
        };
        let mut block_ids = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = self.blocks.query(&filter, 500, offset)?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as u32;
            block_ids.extend(page.into_iter().map(|b| b.block_id));
        }

        let mut deleted_vectors = 0u64;
        for id in &block_ids {
            if self.vectors.delete(id.as_str()).await? {
                deleted_vectors += 1;
            }
        }

        let deleted_blocks = self.blocks.delete_by_repo(repository_id)?;
        let deleted_manifest = self.metadata.delete_repository_index(repository_id)?;

        Ok(PurgeSummary {
            deleted_blocks,
            deleted_vectors,
            deleted_manifest,
        })
    }

    /// Looks a block up by id, hydrating content from C5 only (no vector
    /// round-trip: the caller already has the score from C6).
    pub fn get_block(&self, block_id: &BlockId) -> Result<Option<CodeBlock>, CompositeStorageError> {
        Ok(self.blocks.get(block_id)?)
    }
}

fn vector_metadata(block: &CodeBlock) -> VectorMetadata {
    let mut metadata: VectorMetadata = HashMap::new();
    metadata.insert("repository_id".to_string(), json!(block.repository_id));
    metadata.insert("file_path".to_string(), json!(block.file_path));
    metadata.insert("block_type".to_string(), json!(block.block_type.as_str()));
    if let Some(language) = &block.language {
        metadata.insert("language".to_string(), json!(language));
    }
    if let Some(name) = &block.name {
        metadata.insert("name".to_string(), json!(name));
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use semindex_core::{BlockType, ContentHash, SourceKind};
    use semindex_search::InMemoryVectorStore;

    fn sample_block(id: &str, repo: &str) -> CodeBlock {
        CodeBlock {
            block_id: BlockId(id.to_string()),
            repository_id: repo.to_string(),
            content: "fn foo() {}".to_string(),
            content_hash: ContentHash::of("fn foo() {}"),
            file_path: "src/lib.rs".to_string(),
            line_start: 1,
            line_end: 1,
            char_start: None,
            char_end: None,
            block_type: BlockType::Function,
            language: Some("rust".to_string()),
            name: Some("foo".to_string()),
            full_name: Some("foo".to_string()),
            signature: Some("fn foo()".to_string()),
            class_name: None,
            namespace: None,
            keywords: vec!["foo".to_string()],
            search_text: "foo".to_string(),
            parent_block_id: None,
            child_block_ids: Vec::new(),
            related_block_ids: Vec::new(),
            embedding: None,
            metadata: HashMap::new(),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn save_block_with_vector_persists_both() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CompositeStorage::open(dir.path(), Arc::new(InMemoryVectorStore::new())).unwrap();
        let block = sample_block("b1", "repo1");
        storage
            .save_block_with_vector(block.clone(), Some(vec![1.0, 0.0]))
            .await
            .unwrap();

        assert!(storage.get_block(&block.block_id).unwrap().is_some());
        assert!(storage.vectors.get("b1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_block_without_vector_marks_embedding_missing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CompositeStorage::open(dir.path(), Arc::new(InMemoryVectorStore::new())).unwrap();
        let block = sample_block("b1", "repo1");
        storage.save_block_with_vector(block.clone(), None).await.unwrap();

        assert!(storage.vectors.get("b1").await.unwrap().is_none());
        let filter = BlockQuery {
            repository_id: Some("repo1".to_string()),
            ..Default::default()
        };
        assert_eq!(storage.blocks.query(&filter, 10, 0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_repository_removes_blocks_and_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CompositeStorage::open(dir.path(), Arc::new(InMemoryVectorStore::new())).unwrap();
        let block = sample_block("b1", "repo1");
        storage
            .save_block_with_vector(block.clone(), Some(vec![1.0, 0.0]))
            .await
            .unwrap();
        storage
            .metadata
            .save_repository_index(semindex_core::RepositoryIndex::new(
                "repo1",
                SourceKind::Local,
                "/tmp/repo1",
            ))
            .unwrap();

        let summary = storage.purge_repository("repo1").await.unwrap();
        assert_eq!(summary.deleted_blocks, 1);
        assert_eq!(summary.deleted_vectors, 1);
        assert!(summary.deleted_manifest);
        assert!(storage.get_block(&block.block_id).unwrap().is_none());
    }
}
