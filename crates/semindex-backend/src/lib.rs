//! Orchestration layer over fetch, chunk, embed, and storage: the indexer
//! (C9) that builds a repository's index, and the searcher (C10) that
//! queries it.

mod error;
mod indexer;
mod searcher;

pub use error::BackendError;
pub use indexer::{IndexProgress, IndexStats, Indexer, IndexerConfig, ProgressCallback};
pub use searcher::{SearchFilters, Searcher};

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
