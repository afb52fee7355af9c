//! Core data model: code blocks, repository manifests, search queries and results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content-addressed identifier for a [`CodeBlock`].
///
/// Derived from `repository_id|file_path|line_start|line_end|content_hash`,
/// hashed with SHA-256 and truncated to the first 16 bytes (32 hex chars).
/// Re-chunking the same file range with the same content always yields the
/// same id, which is what makes re-indexing idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn new(
        repository_id: &str,
        file_path: &str,
        line_start: u32,
        line_end: u32,
        content_hash: &ContentHash,
    ) -> Self {
        let key = format!(
            "{repository_id}|{file_path}|{line_start}|{line_end}|{}",
            content_hash.0
        );
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        BlockId(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Digest of a block's literal content, used for deduplication and change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        ContentHash(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Kind of syntactic unit a block represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    File,
    Module,
    Class,
    Function,
    Method,
    Block,
    Comment,
    Import,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::File => "file",
            BlockType::Module => "module",
            BlockType::Class => "class",
            BlockType::Function => "function",
            BlockType::Method => "method",
            BlockType::Block => "block",
            BlockType::Comment => "comment",
            BlockType::Import => "import",
        }
    }
}

impl std::str::FromStr for BlockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(BlockType::File),
            "module" => Ok(BlockType::Module),
            "class" => Ok(BlockType::Class),
            "function" => Ok(BlockType::Function),
            "method" => Ok(BlockType::Method),
            "block" => Ok(BlockType::Block),
            "comment" => Ok(BlockType::Comment),
            "import" => Ok(BlockType::Import),
            other => Err(format!("unknown block type: {other}")),
        }
    }
}

/// The central entity: a chunk of source code with its structural identity,
/// location, and (once embedded) its dense vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub block_id: BlockId,
    pub repository_id: String,
    pub content: String,
    pub content_hash: ContentHash,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub char_start: Option<u32>,
    pub char_end: Option<u32>,
    pub block_type: BlockType,
    pub language: Option<String>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub signature: Option<String>,
    pub class_name: Option<String>,
    pub namespace: Option<String>,
    pub keywords: Vec<String>,
    pub search_text: String,
    pub parent_block_id: Option<BlockId>,
    pub child_block_ids: Vec<BlockId>,
    pub related_block_ids: Vec<BlockId>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CodeBlock {
    /// Builds `search_text` from signature + name + content, the text that is
    /// embedded and matched against during search.
    pub fn build_search_text(
        signature: Option<&str>,
        name: Option<&str>,
        content: &str,
    ) -> String {
        let mut parts = Vec::new();
        if let Some(s) = signature {
            parts.push(s);
        }
        if let Some(n) = name {
            parts.push(n);
        }
        parts.push(content);
        parts.join("\n")
    }
}

/// Where a repository's source came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Git,
    Local,
    Archive,
}

/// Lifecycle state of a repository's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLifecycle {
    Pending,
    Indexing,
    Indexed,
    Failed,
}

/// Manifest describing one repository's indexing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryIndex {
    pub repository_id: String,
    pub source_kind: SourceKind,
    pub location: String,
    pub branch: Option<String>,
    pub commit_hash: Option<String>,
    pub indexed_at: Option<i64>,
    pub file_count: u64,
    pub block_count: u64,
    pub byte_count: u64,
    pub language_distribution: HashMap<String, u64>,
    pub lifecycle: IndexLifecycle,
}

impl RepositoryIndex {
    pub fn new(repository_id: impl Into<String>, source_kind: SourceKind, location: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            source_kind,
            location: location.into(),
            branch: None,
            commit_hash: None,
            indexed_at: None,
            file_count: 0,
            block_count: 0,
            byte_count: 0,
            language_distribution: HashMap::new(),
            lifecycle: IndexLifecycle::Pending,
        }
    }
}

/// Free-form equality filters applied to a search, matched against
/// [`CodeBlock::metadata`].
pub type MetadataFilters = HashMap<String, serde_json::Value>;

/// A search request, persisted for analytics before it is executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query_text: String,
    pub query_type: String,
    pub repository_id: Option<String>,
    pub language: Option<String>,
    pub block_type: Option<BlockType>,
    pub file_path_substring: Option<String>,
    pub metadata_filters: MetadataFilters,
    pub time_window: Option<(i64, i64)>,
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub issued_at: i64,
}

impl SearchQuery {
    pub fn new(query_text: impl Into<String>, top_k: usize, issued_at: i64) -> Self {
        Self {
            query_text: query_text.into(),
            query_type: "text".to_string(),
            repository_id: None,
            language: None,
            block_type: None,
            file_path_substring: None,
            metadata_filters: HashMap::new(),
            time_window: None,
            top_k,
            similarity_threshold: -1.0,
            issued_at,
        }
    }
}

/// Reason a block matched a query, surfaced to callers for explainability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    VectorSimilarity,
    ExactName,
    Recommendation,
}

/// One ranked hit from a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub block: CodeBlock,
    pub score: f32,
    pub match_reason: MatchReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_is_deterministic() {
        let hash = ContentHash::of("fn main() {}");
        let a = BlockId::new("repo", "src/main.rs", 1, 3, &hash);
        let b = BlockId::new("repo", "src/main.rs", 1, 3, &hash);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn block_id_changes_with_content() {
        let hash_a = ContentHash::of("fn main() {}");
        let hash_b = ContentHash::of("fn main() { println!(); }");
        let a = BlockId::new("repo", "src/main.rs", 1, 3, &hash_a);
        let b = BlockId::new("repo", "src/main.rs", 1, 3, &hash_b);
        assert_ne!(a, b);
    }

    #[test]
    fn block_type_round_trips_through_str() {
        for bt in [
            BlockType::File,
            BlockType::Module,
            BlockType::Class,
            BlockType::Function,
            BlockType::Method,
            BlockType::Block,
            BlockType::Comment,
            BlockType::Import,
        ] {
            let parsed: BlockType = bt.as_str().parse().unwrap();
            assert_eq!(parsed.as_str(), bt.as_str());
        }
    }

    #[test]
    fn search_text_concatenates_signature_name_content() {
        let text = CodeBlock::build_search_text(Some("fn foo()"), Some("foo"), "fn foo() {}");
        assert_eq!(text, "fn foo()\nfoo\nfn foo() {}");
    }
}
