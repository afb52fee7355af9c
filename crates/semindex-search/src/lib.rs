//! Embedding client and pluggable vector store backends for semantic code
//! search: the boundary to an external embedding service (C4) and to a
//! nearest-neighbor index (C6).

pub mod error;
pub mod openai;
pub mod provider;
pub mod qdrant_store;
pub mod vector_store;

pub use error::{EmbeddingError, VectorStoreError};
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::EmbeddingProvider;
pub use qdrant_store::{QdrantConfig, QdrantVectorStore};
pub use vector_store::{InMemoryVectorStore, StoredVector, VectorHit, VectorMetadata, VectorStore};
