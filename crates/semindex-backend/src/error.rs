//! Errors surfaced by the indexer and searcher.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] semindex_core::FetchError),

    #[error(transparent)]
    Storage(#[from] semindex_storage::CompositeStorageError),

    #[error("metadata store error: {0}")]
    Metadata(#[from] semindex_storage::MetadataStoreError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] semindex_search::EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] semindex_search::VectorStoreError),

    #[error("repository '{0}' is not indexed")]
    RepositoryNotFound(String),

    #[error("cannot re-index repository '{0}': indexing already in progress")]
    IndexingInProgress(String),

    #[error("invalid search request: {0}")]
    InvalidQuery(String),

    #[error("cancelled")]
    Cancelled,
}
