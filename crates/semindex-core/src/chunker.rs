//! Code Chunker (C2): walks a source tree and turns it into [`CodeBlock`]s.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::error::ChunkError;
use crate::model::{BlockId, BlockType, CodeBlock, ContentHash};
use crate::source::SnippetSource;

/// Configuration for a chunking pass.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Files larger than this are skipped and recorded in `errors`.
    pub max_file_size_bytes: u64,
    /// Glob-style directory/file names excluded from the walk, in addition
    /// to whatever the working tree's own `.gitignore` excludes.
    pub exclude_dirs: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 2 * 1024 * 1024,
            exclude_dirs: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "target".to_string(),
                "__pycache__".to_string(),
                ".venv".to_string(),
                "venv".to_string(),
                "dist".to_string(),
                "build".to_string(),
            ],
        }
    }
}

/// Outcome of chunking one repository: the blocks produced plus any
/// per-file failures that did not abort the walk.
#[derive(Debug, Default)]
pub struct ChunkResult {
    pub blocks: Vec<CodeBlock>,
    pub errors: Vec<(PathBuf, ChunkError)>,
}

/// Walks a source tree and produces [`CodeBlock`]s via a pluggable
/// [`SnippetSource`].
pub struct Chunker {
    config: ChunkerConfig,
    source: Box<dyn SnippetSource>,
}

impl Chunker {
    pub fn new(source: Box<dyn SnippetSource>) -> Self {
        Self {
            config: ChunkerConfig::default(),
            source,
        }
    }

    pub fn with_config(mut self, config: ChunkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Chunks every file under `root`, attributing blocks to `repository_id`.
    /// A per-file parse failure never aborts the walk: it is pushed to
    /// `errors` and the walk continues.
    pub fn chunk_repository(&self, root: &Path, repository_id: &str, now: i64) -> ChunkResult {
        let mut result = ChunkResult::default();

        let mut walker = WalkBuilder::new(root);
        walker.hidden(false).git_ignore(true).git_exclude(true);
        for dir in &self.config.exclude_dirs {
            let dir = dir.clone();
            walker.filter_entry(move |entry| entry.file_name() != dir.as_str());
        }

        for entry in walker.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "walk error");
                    continue;
                }
            };
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            match self.chunk_file(root, relative, repository_id, now) {
                Ok(mut blocks) => result.blocks.append(&mut blocks),
                Err(err) => {
                    debug!(path = %relative.display(), error = %err, "skipping file");
                    result.errors.push((relative.to_path_buf(), err));
                }
            }
        }

        result
    }

    fn chunk_file(
        &self,
        root: &Path,
        relative: &Path,
        repository_id: &str,
        now: i64,
    ) -> Result<Vec<CodeBlock>, ChunkError> {
        let absolute = root.join(relative);
        let metadata = fs::metadata(&absolute).map_err(|e| ChunkError::io(relative, e))?;
        if metadata.len() > self.config.max_file_size_bytes {
            return Err(ChunkError::FileTooLarge {
                path: relative.to_path_buf(),
                size: metadata.len(),
                limit: self.config.max_file_size_bytes,
            });
        }

        let content = fs::read_to_string(&absolute).map_err(|e| ChunkError::io(relative, e))?;
        let file_path = relative.to_string_lossy().replace('\\', "/");
        let line_count = content.lines().count().max(1) as u32;

        let language = self.source.language_for(relative);

        let file_hash = ContentHash::of(&content);
        let file_block_id = BlockId::new(repository_id, &file_path, 1, line_count, &file_hash);
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string());

        let mut blocks = Vec::new();
        let mut child_ids = Vec::new();

        if let Some(language) = language {
            let snippets = self
                .source
                .snippets(relative, &content, language)
                .unwrap_or_else(|err| {
                    warn!(path = %relative.display(), error = %err, "parse failed, emitting file block only");
                    Vec::new()
                });

            let mut class_ids: std::collections::HashMap<String, BlockId> =
                std::collections::HashMap::new();

            // First pass: classes, so methods can resolve parent_block_id.
            for snippet in snippets.iter().filter(|s| s.kind == BlockType::Class) {
                let block = self.build_block(
                    repository_id,
                    &file_path,
                    snippet,
                    &content,
                    language.tag(),
                    Some(file_block_id.clone()),
                    None,
                    now,
                );
                if let Some(name) = &snippet.name {
                    class_ids.insert(name.clone(), block.block_id.clone());
                }
                child_ids.push(block.block_id.clone());
                blocks.push(block);
            }

            for snippet in snippets
                .iter()
                .filter(|s| s.kind != BlockType::Class)
            {
                let parent = snippet
                    .class_name
                    .as_ref()
                    .and_then(|c| class_ids.get(c).cloned())
                    .or_else(|| Some(file_block_id.clone()));
                let block = self.build_block(
                    repository_id,
                    &file_path,
                    snippet,
                    &content,
                    language.tag(),
                    parent.clone(),
                    None,
                    now,
                );
                if let Some(parent_id) = &parent {
                    if *parent_id == file_block_id {
                        child_ids.push(block.block_id.clone());
                    } else if let Some(class_block) =
                        blocks.iter_mut().find(|b| &b.block_id == parent_id)
                    {
                        class_block.child_block_ids.push(block.block_id.clone());
                    }
                }
                blocks.push(block);
            }
        }

        let search_text = CodeBlock::build_search_text(None, file_name.as_deref(), &content);
        let file_block = CodeBlock {
            block_id: file_block_id,
            repository_id: repository_id.to_string(),
            content,
            content_hash: file_hash,
            file_path: file_path.clone(),
            line_start: 1,
            line_end: line_count,
            char_start: None,
            char_end: None,
            block_type: BlockType::File,
            language: language.map(|l| l.tag().to_string()),
            name: file_name.clone(),
            full_name: Some(file_path),
            signature: None,
            class_name: None,
            namespace: None,
            keywords: Vec::new(),
            search_text,
            parent_block_id: None,
            child_block_ids: child_ids,
            related_block_ids: Vec::new(),
            embedding: None,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        };
        blocks.push(file_block);

        Ok(blocks)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_block(
        &self,
        repository_id: &str,
        file_path: &str,
        snippet: &crate::source::Snippet,
        content: &str,
        language: &str,
        parent_block_id: Option<BlockId>,
        related_block_ids: Option<Vec<BlockId>>,
        now: i64,
    ) -> CodeBlock {
        let text = content
            .get(snippet.char_start as usize..snippet.char_end as usize)
            .unwrap_or_default()
            .to_string();
        let content_hash = ContentHash::of(&text);
        let block_id = BlockId::new(
            repository_id,
            file_path,
            snippet.line_start,
            snippet.line_end,
            &content_hash,
        );
        let search_text =
            CodeBlock::build_search_text(snippet.signature.as_deref(), snippet.name.as_deref(), &text);

        CodeBlock {
            block_id,
            repository_id: repository_id.to_string(),
            content: text,
            content_hash,
            file_path: file_path.to_string(),
            line_start: snippet.line_start,
            line_end: snippet.line_end,
            char_start: Some(snippet.char_start),
            char_end: Some(snippet.char_end),
            block_type: snippet.kind,
            language: Some(language.to_string()),
            name: snippet.name.clone(),
            full_name: match &snippet.class_name {
                Some(class) => snippet.name.as_ref().map(|n| format!("{class}.{n}")),
                None => snippet.name.clone(),
            },
            signature: snippet.signature.clone(),
            class_name: snippet.class_name.clone(),
            namespace: None,
            keywords: Vec::new(),
            search_text,
            parent_block_id,
            child_block_ids: Vec::new(),
            related_block_ids: related_block_ids.unwrap_or_default(),
            embedding: None,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TreeSitterSource;
    use tempfile::tempdir;

    #[test]
    fn chunks_a_small_rust_file_into_file_and_function_blocks() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("lib.rs"),
            "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n",
        )
        .unwrap();

        let chunker = Chunker::new(Box::new(TreeSitterSource));
        let result = chunker.chunk_repository(dir.path(), "repo-1", 0);

        assert!(result.errors.is_empty());
        let file_block = result
            .blocks
            .iter()
            .find(|b| b.block_type == BlockType::File)
            .unwrap();
        assert_eq!(file_block.child_block_ids.len(), 1);
        let fn_block = result
            .blocks
            .iter()
            .find(|b| b.block_type == BlockType::Function)
            .unwrap();
        assert_eq!(fn_block.parent_block_id, Some(file_block.block_id.clone()));
    }

    #[test]
    fn oversized_file_is_recorded_as_an_error_not_a_panic() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.rs"), "x".repeat(100)).unwrap();

        let config = ChunkerConfig {
            max_file_size_bytes: 10,
            ..ChunkerConfig::default()
        };
        let chunker = Chunker::new(Box::new(TreeSitterSource)).with_config(config);
        let result = chunker.chunk_repository(dir.path(), "repo-1", 0);

        assert!(result.blocks.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0].1, ChunkError::FileTooLarge { .. }));
    }

    #[test]
    fn unrecognized_extension_still_yields_a_file_block() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "just some notes").unwrap();

        let chunker = Chunker::new(Box::new(TreeSitterSource));
        let result = chunker.chunk_repository(dir.path(), "repo-1", 0);

        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].block_type, BlockType::File);
        assert!(result.blocks[0].language.is_none());
    }
}
