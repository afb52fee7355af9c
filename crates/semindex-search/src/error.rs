//! Errors for the embedding client and vector store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited, retry after {retry_after:?} seconds")]
    RateLimit { retry_after: Option<u64> },

    #[error("model not found: {0}")]
    InvalidModel(String),
}

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("qdrant error: {0}")]
    Qdrant(String),

    #[error("vector id not found: {0}")]
    NotFound(String),
}

impl From<qdrant_client::QdrantError> for VectorStoreError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        VectorStoreError::Qdrant(err.to_string())
    }
}
