//! Core data model, repository fetcher, and code chunker for semantic code
//! indexing: the pieces shared by every other crate in the workspace.

pub mod chunker;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod source;

pub use chunker::{Chunker, ChunkerConfig, ChunkResult};
pub use error::{ChunkError, FetchError};
pub use fetcher::{FetchConfig, Fetcher, WorkingTree};
pub use model::{
    BlockId, BlockType, CodeBlock, ContentHash, IndexLifecycle, MatchReason, MetadataFilters,
    RepositoryIndex, SearchQuery, SearchResult, SourceKind,
};
pub use source::{Snippet, SnippetSource, SourceLanguage, TreeSitterSource};
