//! Vector Store (C6): pluggable backends behind one trait.
//!
//! [`InMemoryVectorStore`] is the reference, exact-cosine implementation
//! used for tests and the `memory` backend; [`QdrantVectorStore`] wraps a
//! persistent ANN index for production use.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::VectorStoreError;

pub type VectorMetadata = HashMap<String, Value>;

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// A stored vector plus its metadata, as returned by `get`.
#[derive(Debug, Clone)]
pub struct StoredVector {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Pluggable nearest-neighbor backend. The first successful `add` fixes the
/// collection's dimension; later mismatched adds fail with
/// `DimensionMismatch`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(
        &self,
        id: String,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<(), VectorStoreError>;

    async fn add_many(
        &self,
        items: Vec<(String, Vec<f32>, VectorMetadata)>,
    ) -> Result<(), VectorStoreError> {
        for (id, vector, metadata) in items {
            self.add(id, vector, metadata).await?;
        }
        Ok(())
    }

    /// Raw top-k search with a backend-native filter already applied
    /// (push-down) or no filter at all. [`VectorStore::search_filtered`]
    /// builds on this to add post-hoc filtering for backends that can't
    /// push filters down.
    async fn search_raw(
        &self,
        query_vector: &[f32],
        top_k: usize,
        metadata_filter: Option<&VectorMetadata>,
    ) -> Result<Vec<VectorHit>, VectorStoreError>;

    /// Whether this backend can push `metadata_filter` into `search_raw`
    /// itself (`true`) or needs the default post-hoc filtering in
    /// `search_filtered` (`false`).
    fn supports_filter_pushdown(&self) -> bool;

    async fn get(&self, id: &str) -> Result<Option<StoredVector>, VectorStoreError>;

    async fn delete(&self, id: &str) -> Result<bool, VectorStoreError>;

    async fn delete_many(&self, ids: &[String]) -> Result<usize, VectorStoreError> {
        let mut count = 0;
        for id in ids {
            if self.delete(id).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update(
        &self,
        id: &str,
        vector: Option<Vec<f32>>,
        metadata: Option<VectorMetadata>,
    ) -> Result<bool, VectorStoreError>;

    async fn count(&self, metadata_filter: Option<&VectorMetadata>) -> Result<usize, VectorStoreError>;

    /// Ordered by descending score, ties broken by ascending id. Applies
    /// `metadata_filter` before top-k truncation when the backend supports
    /// push-down; otherwise requests `2*top_k` candidates and filters
    /// post-hoc, doubling the request size until `top_k` survive the filter
    /// or the backend is exhausted.
    async fn search_filtered(
        &self,
        query_vector: &[f32],
        top_k: usize,
        metadata_filter: Option<&VectorMetadata>,
    ) -> Result<Vec<VectorHit>, VectorStoreError> {
        if self.supports_filter_pushdown() || metadata_filter.is_none() {
            let mut hits = self.search_raw(query_vector, top_k, metadata_filter).await?;
            sort_and_truncate(&mut hits, top_k);
            return Ok(hits);
        }

        let filter = metadata_filter.unwrap();
        let mut requested = (top_k * 2).max(top_k + 10);
        let total = self.count(None).await?;
        loop {
            let candidates = self.search_raw(query_vector, requested, None).await?;
            let exhausted = candidates.len() >= total;
            let mut filtered: Vec<VectorHit> = candidates
                .into_iter()
                .filter(|hit| matches_filter(&hit.metadata, filter))
                .collect();
            if filtered.len() >= top_k || exhausted {
                sort_and_truncate(&mut filtered, top_k);
                return Ok(filtered);
            }
            requested *= 2;
        }
    }
}

fn sort_and_truncate(hits: &mut Vec<VectorHit>, top_k: usize) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(top_k);
}

fn matches_filter(metadata: &VectorMetadata, filter: &VectorMetadata) -> bool {
    filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Flat, exact-cosine in-memory vector store. Reference semantics for the
/// `search`/`add`/dimension-fixing contract; used in tests and as the
/// `memory` storage backend.
pub struct InMemoryVectorStore {
    inner: parking_lot::RwLock<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    dimension: Option<usize>,
    vectors: HashMap<String, (Vec<f32>, VectorMetadata)>,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            inner: parking_lot::RwLock::new(InMemoryState::default()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(
        &self,
        id: String,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<(), VectorStoreError> {
        let mut state = self.inner.write();
        match state.dimension {
            None => state.dimension = Some(vector.len()),
            Some(expected) if expected != vector.len() => {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                })
            }
            _ => {}
        }
        state.vectors.insert(id, (vector, metadata));
        Ok(())
    }

    async fn search_raw(
        &self,
        query_vector: &[f32],
        top_k: usize,
        metadata_filter: Option<&VectorMetadata>,
    ) -> Result<Vec<VectorHit>, VectorStoreError> {
        let state = self.inner.read();
        let mut hits: Vec<VectorHit> = state
            .vectors
            .iter()
            .filter(|(_, (_, metadata))| {
                metadata_filter.is_none_or(|filter| matches_filter(metadata, filter))
            })
            .map(|(id, (vector, metadata))| VectorHit {
                id: id.clone(),
                score: cosine_similarity(query_vector, vector),
                metadata: metadata.clone(),
            })
            .collect();
        sort_and_truncate(&mut hits, top_k);
        Ok(hits)
    }

    fn supports_filter_pushdown(&self) -> bool {
        // The in-memory backend filters candidates itself inside
        // `search_raw`, so push-down is trivially available.
        true
    }

    async fn get(&self, id: &str) -> Result<Option<StoredVector>, VectorStoreError> {
        let state = self.inner.read();
        Ok(state.vectors.get(id).map(|(vector, metadata)| StoredVector {
            id: id.to_string(),
            vector: vector.clone(),
            metadata: metadata.clone(),
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, VectorStoreError> {
        Ok(self.inner.write().vectors.remove(id).is_some())
    }

    async fn update(
        &self,
        id: &str,
        vector: Option<Vec<f32>>,
        metadata: Option<VectorMetadata>,
    ) -> Result<bool, VectorStoreError> {
        let mut state = self.inner.write();
        let dimension = state.dimension;
        let Some((existing_vector, existing_metadata)) = state.vectors.get_mut(id) else {
            return Ok(false);
        };
        if let Some(new_vector) = vector {
            if let Some(expected) = dimension {
                if expected != new_vector.len() {
                    return Err(VectorStoreError::DimensionMismatch {
                        expected,
                        actual: new_vector.len(),
                    });
                }
            }
            *existing_vector = new_vector;
        }
        if let Some(new_metadata) = metadata {
            *existing_metadata = new_metadata;
        }
        Ok(true)
    }

    async fn count(&self, metadata_filter: Option<&VectorMetadata>) -> Result<usize, VectorStoreError> {
        let state = self.inner.read();
        Ok(match metadata_filter {
            None => state.vectors.len(),
            Some(filter) => state
                .vectors
                .values()
                .filter(|(_, metadata)| matches_filter(metadata, filter))
                .count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn first_add_fixes_dimension() {
        let store = InMemoryVectorStore::new();
        store.add("a".into(), vec![1.0, 0.0], HashMap::new()).await.unwrap();
        let err = store
            .add("b".into(), vec![1.0, 0.0, 0.0], HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch { expected: 2, actual: 3 }
        ));
    }

    #[tokio::test]
    async fn search_orders_by_descending_score_then_ascending_id() {
        let store = InMemoryVectorStore::new();
        store.add("b".into(), vec![1.0, 0.0], HashMap::new()).await.unwrap();
        store.add("a".into(), vec![1.0, 0.0], HashMap::new()).await.unwrap();
        store.add("c".into(), vec![0.0, 1.0], HashMap::new()).await.unwrap();

        let hits = store.search_raw(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
        assert_eq!(hits[2].id, "c");
    }

    #[tokio::test]
    async fn metadata_filter_excludes_non_matching_vectors() {
        let store = InMemoryVectorStore::new();
        let mut meta_a = HashMap::new();
        meta_a.insert("language".to_string(), json!("rust"));
        let mut meta_b = HashMap::new();
        meta_b.insert("language".to_string(), json!("python"));

        store.add("a".into(), vec![1.0, 0.0], meta_a).await.unwrap();
        store.add("b".into(), vec![1.0, 0.0], meta_b).await.unwrap();

        let mut filter = HashMap::new();
        filter.insert("language".to_string(), json!("rust"));
        let hits = store
            .search_filtered(&[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn delete_and_get_roundtrip() {
        let store = InMemoryVectorStore::new();
        store.add("a".into(), vec![1.0], HashMap::new()).await.unwrap();
        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
        assert!(!store.delete("a").await.unwrap());
    }
}
