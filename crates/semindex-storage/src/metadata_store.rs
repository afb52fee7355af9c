//! Metadata Store (C7): JSON-file key/value plus two named collections.
//!
//! Grounded in the original `LocalMetadataStorage`'s `repositories.json` /
//! `search_history.json` / `general.json` trio and its ring-buffer eviction
//! of search history at N = 1000. Each file is guarded by its own
//! `parking_lot::RwLock` so reads are linearizable per collection without
//! serializing collections against each other.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use semindex_core::{RepositoryIndex, SearchQuery};
use serde_json::Value;

use crate::error::MetadataStoreError;

const SEARCH_HISTORY_LIMIT: usize = 1000;

/// JSON-file-backed metadata store.
pub struct MetadataStore {
    repositories_file: PathBuf,
    search_history_file: PathBuf,
    general_file: PathBuf,
    repositories: RwLock<Vec<RepositoryIndex>>,
    search_history: RwLock<Vec<SearchQuery>>,
    general: RwLock<serde_json::Map<String, Value>>,
}

impl MetadataStore {
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, MetadataStoreError> {
        let metadata_dir = base_path.as_ref().join("metadata");
        std::fs::create_dir_all(&metadata_dir).map_err(|e| MetadataStoreError::io(&metadata_dir, e))?;

        let repositories_file = metadata_dir.join("repositories.json");
        let search_history_file = metadata_dir.join("search_history.json");
        let general_file = metadata_dir.join("general.json");

        let repositories = read_or_init(&repositories_file, Vec::new)?;
        let search_history = read_or_init(&search_history_file, Vec::new)?;
        let general = read_or_init(&general_file, serde_json::Map::new)?;

        Ok(Self {
            repositories_file,
            search_history_file,
            general_file,
            repositories: RwLock::new(repositories),
            search_history: RwLock::new(search_history),
            general: RwLock::new(general),
        })
    }

    /// Upsert by `repository_id`.
    pub fn save_repository_index(&self, index: RepositoryIndex) -> Result<(), MetadataStoreError> {
        let mut repos = self.repositories.write();
        if let Some(existing) = repos.iter_mut().find(|r| r.repository_id == index.repository_id) {
            *existing = index;
        } else {
            repos.push(index);
        }
        write_json(&self.repositories_file, &*repos)
    }

    pub fn get_repository_index(&self, repository_id: &str) -> Option<RepositoryIndex> {
        self.repositories
            .read()
            .iter()
            .find(|r| r.repository_id == repository_id)
            .cloned()
    }

    pub fn list_repository_indexes(&self) -> Vec<RepositoryIndex> {
        self.repositories.read().clone()
    }

    pub fn delete_repository_index(&self, repository_id: &str) -> Result<bool, MetadataStoreError> {
        let mut repos = self.repositories.write();
        let before = repos.len();
        repos.retain(|r| r.repository_id != repository_id);
        let changed = repos.len() != before;
        if changed {
            write_json(&self.repositories_file, &*repos)?;
        }
        Ok(changed)
    }

    /// Append-only, bounded to the most recent [`SEARCH_HISTORY_LIMIT`]
    /// entries with ring-buffer eviction of the oldest.
    pub fn save_search_query(&self, query: SearchQuery) -> Result<(), MetadataStoreError> {
        let mut history = self.search_history.write();
        history.push(query);
        if history.len() > SEARCH_HISTORY_LIMIT {
            let overflow = history.len() - SEARCH_HISTORY_LIMIT;
            history.drain(0..overflow);
        }
        write_json(&self.search_history_file, &*history)
    }

    /// Most recent first.
    pub fn get_search_history(&self, limit: usize, offset: usize) -> Vec<SearchQuery> {
        let history = self.search_history.read();
        history
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_metadata(&self, key: &str) -> Option<Value> {
        self.general.read().get(key).cloned()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: Value) -> Result<(), MetadataStoreError> {
        let mut general = self.general.write();
        general.insert(key.into(), value);
        write_json(&self.general_file, &*general)
    }

    pub fn delete_metadata(&self, key: &str) -> Result<bool, MetadataStoreError> {
        let mut general = self.general.write();
        let removed = general.remove(key).is_some();
        if removed {
            write_json(&self.general_file, &*general)?;
        }
        Ok(removed)
    }

    pub fn list_metadata_keys(&self) -> Vec<String> {
        self.general.read().keys().cloned().collect()
    }
}

fn read_or_init<T: serde::de::DeserializeOwned + serde::Serialize>(
    path: &Path,
    default: impl FnOnce() -> T,
) -> Result<T, MetadataStoreError> {
    if !path.exists() {
        let value = default();
        write_json(path, &value)?;
        return Ok(value);
    }
    let text = std::fs::read_to_string(path).map_err(|e| MetadataStoreError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), MetadataStoreError> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).map_err(|e| MetadataStoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semindex_core::SourceKind;

    #[test]
    fn repository_index_upserts_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        let mut index = RepositoryIndex::new("repo1", SourceKind::Local, "/tmp/repo1");
        store.save_repository_index(index.clone()).unwrap();
        index.file_count = 5;
        store.save_repository_index(index.clone()).unwrap();

        let all = store.list_repository_indexes();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].file_count, 5);
    }

    #[test]
    fn search_history_evicts_oldest_beyond_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        for i in 0..(SEARCH_HISTORY_LIMIT + 5) {
            store
                .save_search_query(SearchQuery::new(format!("q{i}"), 10, i as i64))
                .unwrap();
        }
        let recent = store.get_search_history(1, 0);
        assert_eq!(recent[0].query_text, format!("q{}", SEARCH_HISTORY_LIMIT + 4));
    }

    #[test]
    fn general_metadata_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        store.set_metadata("key1", serde_json::json!("value1")).unwrap();
        assert_eq!(store.get_metadata("key1"), Some(serde_json::json!("value1")));
        assert!(store.delete_metadata("key1").unwrap());
        assert_eq!(store.get_metadata("key1"), None);
    }

    #[test]
    fn reopening_store_reloads_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MetadataStore::open(dir.path()).unwrap();
            store
                .save_repository_index(RepositoryIndex::new("repo1", SourceKind::Local, "/tmp/repo1"))
                .unwrap();
        }
        let reopened = MetadataStore::open(dir.path()).unwrap();
        assert_eq!(reopened.list_repository_indexes().len(), 1);
    }
}
