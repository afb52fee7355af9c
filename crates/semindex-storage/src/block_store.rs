//! Code-Block Store (C5): SQLite for queryable fields and relations, flat
//! files for content blobs.
//!
//! Schema mirrors the teacher's partition schema (`blocks`/`edges` tables,
//! `(from_id, to_id, kind)` unique) adapted to the block-store contract; the
//! content/blob split follows the original Python `LocalCodeBlockStorage`.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use semindex_core::{BlockId, BlockType, CodeBlock, ContentHash};

use crate::error::BlockStoreError;

const SCHEMA_CREATE_BLOCKS: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    block_id TEXT PRIMARY KEY NOT NULL,
    repository_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    char_start INTEGER,
    char_end INTEGER,
    block_type TEXT NOT NULL,
    language TEXT,
    name TEXT,
    full_name TEXT,
    signature TEXT,
    class_name TEXT,
    namespace TEXT,
    keywords TEXT NOT NULL,
    search_text TEXT NOT NULL,
    parent_block_id TEXT,
    metadata TEXT NOT NULL,
    embedding_missing INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

const SCHEMA_CREATE_EDGES: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    UNIQUE(from_id, to_id, kind)
)
"#;

const SCHEMA_CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_blocks_repository_id ON blocks(repository_id);
CREATE INDEX IF NOT EXISTS idx_blocks_language ON blocks(language);
CREATE INDEX IF NOT EXISTS idx_blocks_block_type ON blocks(block_type);
CREATE INDEX IF NOT EXISTS idx_blocks_file_path ON blocks(file_path);
CREATE INDEX IF NOT EXISTS idx_blocks_name ON blocks(name);
CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id);
"#;

const CHILD_EDGE: &str = "child";
const RELATED_EDGE: &str = "related";

/// Filters accepted by [`CodeBlockStore::query`]/[`CodeBlockStore::count`].
#[derive(Debug, Clone, Default)]
pub struct BlockQuery {
    pub repository_id: Option<String>,
    pub language: Option<String>,
    pub block_type: Option<BlockType>,
    pub file_path_substring: Option<String>,
}

/// SQLite-backed code-block store with content blobs on the filesystem.
pub struct CodeBlockStore {
    conn: Mutex<Connection>,
    content_dir: PathBuf,
}

impl CodeBlockStore {
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, BlockStoreError> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path)?;
        let content_dir = base_path.join("content");
        std::fs::create_dir_all(&content_dir)?;

        let db_path = base_path.join("code_blocks.db");
        let conn = Connection::open(db_path)?;
        conn.execute(SCHEMA_CREATE_BLOCKS, [])?;
        conn.execute(SCHEMA_CREATE_EDGES, [])?;
        conn.execute_batch(SCHEMA_CREATE_INDEXES)?;

        Ok(Self {
            conn: Mutex::new(conn),
            content_dir,
        })
    }

    fn content_path(&self, block_id: &BlockId) -> PathBuf {
        self.content_dir.join(format!("{}.txt", block_id.as_str()))
    }

    /// Upsert by `block_id`; writes the row, the content blob, and the
    /// child/related edges in one transaction.
    pub fn save(&self, block: &CodeBlock) -> Result<(), BlockStoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        upsert_block(&tx, block)?;
        save_edges(&tx, block)?;
        tx.commit()?;
        std::fs::write(self.content_path(&block.block_id), &block.content)?;
        Ok(())
    }

    pub fn save_many(&self, blocks: &[CodeBlock]) -> Result<(), BlockStoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for block in blocks {
            upsert_block(&tx, block)?;
            save_edges(&tx, block)?;
        }
        tx.commit()?;
        for block in blocks {
            std::fs::write(self.content_path(&block.block_id), &block.content)?;
        }
        Ok(())
    }

    pub fn get(&self, block_id: &BlockId) -> Result<Option<CodeBlock>, BlockStoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT * FROM blocks WHERE block_id = ?1",
                params![block_id.as_str()],
                row_to_block,
            )
            .optional()?;
        let Some(mut block) = row else {
            return Ok(None);
        };
        block.content = self.read_content(&block.block_id)?;
        load_edges(&conn, &mut block)?;
        Ok(Some(block))
    }

    /// Preserves request order; missing ids are omitted.
    pub fn get_many(&self, block_ids: &[BlockId]) -> Result<Vec<CodeBlock>, BlockStoreError> {
        let mut result = Vec::with_capacity(block_ids.len());
        for id in block_ids {
            if let Some(block) = self.get(id)? {
                result.push(block);
            }
        }
        Ok(result)
    }

    /// Filter-then-page; ordered by `created_at` descending, then `block_id`.
    pub fn query(
        &self,
        filter: &BlockQuery,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CodeBlock>, BlockStoreError> {
        let conn = self.conn.lock();
        let (where_clause, params) = build_where(filter);
        let sql = format!(
            "SELECT * FROM blocks{where_clause} ORDER BY created_at DESC, block_id ASC LIMIT ?{} OFFSET ?{}",
            params.len() + 1,
            params.len() + 2,
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut all_params: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        all_params.push(&limit);
        all_params.push(&offset);
        let rows = stmt.query_map(all_params.as_slice(), row_to_block)?;
        let mut blocks = Vec::new();
        for row in rows {
            let mut block = row?;
            block.content = self.read_content(&block.block_id)?;
            load_edges(&conn, &mut block)?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    pub fn count(&self, filter: &BlockQuery) -> Result<u64, BlockStoreError> {
        let conn = self.conn.lock();
        let (where_clause, params) = build_where(filter);
        let sql = format!("SELECT COUNT(*) FROM blocks{where_clause}");
        let params: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, params.as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Removes the row, its edges, and the content blob. Returns whether the
    /// block was present.
    pub fn delete(&self, block_id: &BlockId) -> Result<bool, BlockStoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM edges WHERE from_id = ?1 OR to_id = ?1",
            params![block_id.as_str()],
        )?;
        let deleted = tx.execute(
            "DELETE FROM blocks WHERE block_id = ?1",
            params![block_id.as_str()],
        )?;
        tx.commit()?;
        let _ = std::fs::remove_file(self.content_path(block_id));
        Ok(deleted > 0)
    }

    /// Cascading delete of every block (and edge, and content blob) for a
    /// repository. Returns the number of blocks removed.
    pub fn delete_by_repo(&self, repository_id: &str) -> Result<u64, BlockStoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let ids: Vec<String> = {
            let mut stmt = tx.prepare("SELECT block_id FROM blocks WHERE repository_id = ?1")?;
            let rows = stmt.query_map(params![repository_id], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        for id in &ids {
            tx.execute("DELETE FROM edges WHERE from_id = ?1 OR to_id = ?1", params![id])?;
        }
        let deleted = tx.execute(
            "DELETE FROM blocks WHERE repository_id = ?1",
            params![repository_id],
        )?;
        tx.commit()?;
        for id in &ids {
            let _ = std::fs::remove_file(self.content_dir.join(format!("{id}.txt")));
        }
        Ok(deleted as u64)
    }

    /// Marks `embedding_missing` so a later pass can retry embedding without
    /// re-chunking.
    pub fn mark_embedding_missing(&self, block_id: &BlockId, missing: bool) -> Result<(), BlockStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE blocks SET embedding_missing = ?2 WHERE block_id = ?1",
            params![block_id.as_str(), missing as i64],
        )?;
        Ok(())
    }

    /// Restartable, batch-at-a-time iteration in `created_at` order; safe
    /// under concurrent inserts since each batch is its own consistent read.
    pub fn iter_batches(
        &self,
        repository_id: Option<&str>,
        batch_size: u32,
    ) -> BlockBatchIter<'_> {
        BlockBatchIter {
            store: self,
            repository_id: repository_id.map(str::to_string),
            batch_size,
            offset: 0,
            exhausted: false,
        }
    }

    fn read_content(&self, block_id: &BlockId) -> Result<String, BlockStoreError> {
        let path = self.content_path(block_id);
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Lazy batch-at-a-time iterator over [`CodeBlockStore::query`].
pub struct BlockBatchIter<'a> {
    store: &'a CodeBlockStore,
    repository_id: Option<String>,
    batch_size: u32,
    offset: u32,
    exhausted: bool,
}

impl<'a> Iterator for BlockBatchIter<'a> {
    type Item = Result<Vec<CodeBlock>, BlockStoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let filter = BlockQuery {
            repository_id: self.repository_id.clone(),
            ..Default::default()
        };
        match self.store.query(&filter, self.batch_size, self.offset) {
            Ok(batch) => {
                if batch.is_empty() {
                    self.exhausted = true;
                    return None;
                }
                self.offset += batch.len() as u32;
                if (batch.len() as u32) < self.batch_size {
                    self.exhausted = true;
                }
                Some(Ok(batch))
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

fn build_where(filter: &BlockQuery) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(repository_id) = &filter.repository_id {
        conditions.push(format!("repository_id = ?{}", params.len() + 1));
        params.push(Box::new(repository_id.clone()));
    }
    if let Some(language) = &filter.language {
        conditions.push(format!("language = ?{}", params.len() + 1));
        params.push(Box::new(language.clone()));
    }
    if let Some(block_type) = &filter.block_type {
        conditions.push(format!("block_type = ?{}", params.len() + 1));
        params.push(Box::new(block_type.as_str().to_string()));
    }
    if let Some(substring) = &filter.file_path_substring {
        conditions.push(format!("file_path LIKE ?{}", params.len() + 1));
        params.push(Box::new(format!("%{substring}%")));
    }

    if conditions.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), params)
    }
}

fn upsert_block(conn: &Connection, block: &CodeBlock) -> Result<(), BlockStoreError> {
    conn.execute(
        "INSERT INTO blocks (
            block_id, repository_id, content_hash, file_path, line_start, line_end,
            char_start, char_end, block_type, language, name, full_name, signature,
            class_name, namespace, keywords, search_text, parent_block_id, metadata,
            embedding_missing, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
        ON CONFLICT(block_id) DO UPDATE SET
            repository_id = excluded.repository_id,
            content_hash = excluded.content_hash,
            file_path = excluded.file_path,
            line_start = excluded.line_start,
            line_end = excluded.line_end,
            char_start = excluded.char_start,
            char_end = excluded.char_end,
            block_type = excluded.block_type,
            language = excluded.language,
            name = excluded.name,
            full_name = excluded.full_name,
            signature = excluded.signature,
            class_name = excluded.class_name,
            namespace = excluded.namespace,
            keywords = excluded.keywords,
            search_text = excluded.search_text,
            parent_block_id = excluded.parent_block_id,
            metadata = excluded.metadata,
            embedding_missing = excluded.embedding_missing,
            updated_at = excluded.updated_at",
        params![
            block.block_id.as_str(),
            block.repository_id,
            block.content_hash.as_str(),
            block.file_path,
            block.line_start,
            block.line_end,
            block.char_start,
            block.char_end,
            block.block_type.as_str(),
            block.language,
            block.name,
            block.full_name,
            block.signature,
            block.class_name,
            block.namespace,
            serde_json::to_string(&block.keywords)?,
            block.search_text,
            block.parent_block_id.as_ref().map(BlockId::as_str),
            serde_json::to_string(&block.metadata)?,
            false as i64,
            block.created_at,
            block.updated_at,
        ],
    )?;
    Ok(())
}

fn save_edges(conn: &Connection, block: &CodeBlock) -> Result<(), BlockStoreError> {
    for child in &block.child_block_ids {
        conn.execute(
            "INSERT OR IGNORE INTO edges (from_id, to_id, kind) VALUES (?1, ?2, ?3)",
            params![block.block_id.as_str(), child.as_str(), CHILD_EDGE],
        )?;
    }
    for related in &block.related_block_ids {
        conn.execute(
            "INSERT OR IGNORE INTO edges (from_id, to_id, kind) VALUES (?1, ?2, ?3)",
            params![block.block_id.as_str(), related.as_str(), RELATED_EDGE],
        )?;
    }
    Ok(())
}

fn load_edges(conn: &Connection, block: &mut CodeBlock) -> Result<(), BlockStoreError> {
    let mut stmt = conn.prepare("SELECT to_id, kind FROM edges WHERE from_id = ?1")?;
    let rows = stmt.query_map(params![block.block_id.as_str()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    block.child_block_ids.clear();
    block.related_block_ids.clear();
    for row in rows {
        let (to_id, kind) = row?;
        if kind == CHILD_EDGE {
            block.child_block_ids.push(BlockId(to_id));
        } else {
            block.related_block_ids.push(BlockId(to_id));
        }
    }
    Ok(())
}

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<CodeBlock> {
    let keywords_json: String = row.get("keywords")?;
    let metadata_json: String = row.get("metadata")?;
    let block_type: String = row.get("block_type")?;
    let parent_block_id: Option<String> = row.get("parent_block_id")?;

    Ok(CodeBlock {
        block_id: BlockId(row.get("block_id")?),
        repository_id: row.get("repository_id")?,
        content: String::new(),
        content_hash: ContentHash(row.get("content_hash")?),
        file_path: row.get("file_path")?,
        line_start: row.get("line_start")?,
        line_end: row.get("line_end")?,
        char_start: row.get("char_start")?,
        char_end: row.get("char_end")?,
        block_type: block_type.parse().unwrap_or(BlockType::Block),
        language: row.get("language")?,
        name: row.get("name")?,
        full_name: row.get("full_name")?,
        signature: row.get("signature")?,
        class_name: row.get("class_name")?,
        namespace: row.get("namespace")?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        search_text: row.get("search_text")?,
        parent_block_id: parent_block_id.map(BlockId),
        child_block_ids: Vec::new(),
        related_block_ids: Vec::new(),
        embedding: None,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_block(id: &str, repo: &str, name: &str) -> CodeBlock {
        let hash = ContentHash::of(name);
        CodeBlock {
            block_id: BlockId(id.to_string()),
            repository_id: repo.to_string(),
            content: format!("fn {name}() {{}}"),
            content_hash: hash,
            file_path: "src/lib.rs".to_string(),
            line_start: 1,
            line_end: 3,
            char_start: None,
            char_end: None,
            block_type: BlockType::Function,
            language: Some("rust".to_string()),
            name: Some(name.to_string()),
            full_name: Some(name.to_string()),
            signature: Some(format!("fn {name}()")),
            class_name: None,
            namespace: None,
            keywords: vec![name.to_string()],
            search_text: name.to_string(),
            parent_block_id: None,
            child_block_ids: Vec::new(),
            related_block_ids: Vec::new(),
            embedding: None,
            metadata: HashMap::new(),
            created_at: 1000,
            updated_at: 1000,
        }
    }

    #[test]
    fn save_and_get_round_trips_content_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = CodeBlockStore::open(dir.path()).unwrap();
        let block = sample_block("b1", "repo1", "foo");
        store.save(&block).unwrap();

        let fetched = store.get(&block.block_id).unwrap().unwrap();
        assert_eq!(fetched.content, block.content);
        assert_eq!(fetched.name, block.name);
    }

    #[test]
    fn get_returns_none_for_missing_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = CodeBlockStore::open(dir.path()).unwrap();
        assert!(store.get(&BlockId("nope".to_string())).unwrap().is_none());
    }

    #[test]
    fn query_filters_by_repository_and_orders_stably() {
        let dir = tempfile::tempdir().unwrap();
        let store = CodeBlockStore::open(dir.path()).unwrap();
        let mut b1 = sample_block("b1", "repo1", "foo");
        b1.created_at = 1000;
        let mut b2 = sample_block("b2", "repo1", "bar");
        b2.created_at = 2000;
        let b3 = sample_block("b3", "repo2", "baz");
        store.save(&b1).unwrap();
        store.save(&b2).unwrap();
        store.save(&b3).unwrap();

        let filter = BlockQuery {
            repository_id: Some("repo1".to_string()),
            ..Default::default()
        };
        let results = store.query(&filter, 10, 0).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].block_id.as_str(), "b2");
        assert_eq!(results[1].block_id.as_str(), "b1");
    }

    #[test]
    fn delete_by_repo_removes_blocks_edges_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = CodeBlockStore::open(dir.path()).unwrap();
        let mut parent = sample_block("p1", "repo1", "parent");
        parent.child_block_ids.push(BlockId("c1".to_string()));
        let child = sample_block("c1", "repo1", "child");
        store.save(&parent).unwrap();
        store.save(&child).unwrap();

        let deleted = store.delete_by_repo("repo1").unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get(&BlockId("p1".to_string())).unwrap().is_none());
        assert!(!store.content_path(&BlockId("p1".to_string())).exists());
    }

    #[test]
    fn child_edges_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CodeBlockStore::open(dir.path()).unwrap();
        let mut parent = sample_block("p1", "repo1", "parent");
        parent.child_block_ids.push(BlockId("c1".to_string()));
        store.save(&parent).unwrap();

        let fetched = store.get(&BlockId("p1".to_string())).unwrap().unwrap();
        assert_eq!(fetched.child_block_ids, vec![BlockId("c1".to_string())]);
    }

    #[test]
    fn iter_batches_covers_all_blocks_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CodeBlockStore::open(dir.path()).unwrap();
        for i in 0..5 {
            store.save(&sample_block(&format!("b{i}"), "repo1", &format!("fn{i}"))).unwrap();
        }

        let mut seen = Vec::new();
        for batch in store.iter_batches(Some("repo1"), 2) {
            seen.extend(batch.unwrap());
        }
        assert_eq!(seen.len(), 5);
    }
}
