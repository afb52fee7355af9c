//! Qdrant-backed [`VectorStore`]: durable ANN index with a metadata sidecar.
//!
//! Deletes are tombstones Qdrant compacts opportunistically; cosine distance
//! is native (`Distance::Cosine` already returns `[-1, 1]`), so no score
//! rescaling is needed.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, vectors_config::Config, Condition, CreateCollectionBuilder,
    DeletePointsBuilder, Filter, PointId, PointStruct, PointsIdsList, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParams, VectorsConfig,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value;

use crate::error::VectorStoreError;
use crate::vector_store::{StoredVector, VectorHit, VectorMetadata, VectorStore};

#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            collection: collection.into(),
        }
    }
}

/// Qdrant-backed [`VectorStore`]. The collection is created lazily on the
/// first `add`, with its dimension fixed to that first vector's length.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    pub async fn connect(config: QdrantConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .map_err(|e| VectorStoreError::Qdrant(e.to_string()))?;
        Ok(Self {
            client,
            collection: config.collection,
        })
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorStoreError> {
        let exists = self.client.collection_exists(&self.collection).await?;
        if exists {
            return Ok(());
        }
        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: dimension as u64,
                distance: qdrant_client::qdrant::Distance::Cosine.into(),
                ..Default::default()
            })),
        };
        self.client
            .create_collection(CreateCollectionBuilder::new(&self.collection).vectors_config(vectors_config))
            .await?;
        Ok(())
    }

    fn build_filter(metadata_filter: &VectorMetadata) -> Filter {
        let conditions: Vec<Condition> = metadata_filter
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => Condition::matches(key, s.clone()),
                other => Condition::matches(key, other.to_string()),
            })
            .collect();
        Filter::must(conditions)
    }

    fn payload_to_metadata(payload: HashMap<String, qdrant_client::qdrant::Value>) -> VectorMetadata {
        payload
            .into_iter()
            .filter_map(|(k, v)| serde_json::to_value(qdrant_payload_value(v)).ok().map(|v| (k, v)))
            .collect()
    }
}

fn qdrant_payload_value(value: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;
    match value.kind {
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null),
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        _ => Value::Null,
    }
}

fn metadata_to_payload(metadata: &VectorMetadata) -> Payload {
    let map: serde_json::Map<String, Value> = metadata.clone().into_iter().collect();
    Payload::try_from(Value::Object(map)).unwrap_or_default()
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn add(
        &self,
        id: String,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<(), VectorStoreError> {
        self.ensure_collection(vector.len()).await?;
        let payload = metadata_to_payload(&metadata);
        let point = PointStruct::new(id, vector, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]))
            .await?;
        Ok(())
    }

    async fn search_raw(
        &self,
        query_vector: &[f32],
        top_k: usize,
        metadata_filter: Option<&VectorMetadata>,
    ) -> Result<Vec<VectorHit>, VectorStoreError> {
        let mut builder = SearchPointsBuilder::new(&self.collection, query_vector.to_vec(), top_k as u64)
            .with_payload(true);
        if let Some(filter) = metadata_filter {
            builder = builder.filter(Self::build_filter(filter));
        }
        let response = self.client.search_points(builder).await?;
        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let id = match point.id.and_then(|id| id.point_id_options) {
                    Some(PointIdOptions::Uuid(u)) => u,
                    Some(PointIdOptions::Num(n)) => n.to_string(),
                    None => String::new(),
                };
                VectorHit {
                    id,
                    score: point.score,
                    metadata: Self::payload_to_metadata(point.payload),
                }
            })
            .collect())
    }

    fn supports_filter_pushdown(&self) -> bool {
        true
    }

    async fn get(&self, id: &str) -> Result<Option<StoredVector>, VectorStoreError> {
        let point_id = PointId::from(id.to_string());
        let response = self
            .client
            .get_points(qdrant_client::qdrant::GetPointsBuilder::new(
                &self.collection,
                vec![point_id],
            ).with_vectors(true).with_payload(true))
            .await?;
        Ok(response.result.into_iter().next().map(|point| StoredVector {
            id: id.to_string(),
            vector: point
                .vectors
                .and_then(|v| v.vectors_options)
                .map(|opt| match opt {
                    qdrant_client::qdrant::vectors_output::VectorsOptions::Vector(v) => v.data,
                    _ => Vec::new(),
                })
                .unwrap_or_default(),
            metadata: Self::payload_to_metadata(point.payload),
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, VectorStoreError> {
        let existed = self.get(id).await?.is_some();
        if !existed {
            return Ok(false);
        }
        let points = PointsIdsList {
            ids: vec![PointId::from(id.to_string())],
        };
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(points),
            )
            .await?;
        Ok(true)
    }

    async fn update(
        &self,
        id: &str,
        vector: Option<Vec<f32>>,
        metadata: Option<VectorMetadata>,
    ) -> Result<bool, VectorStoreError> {
        let Some(existing) = self.get(id).await? else {
            return Ok(false);
        };
        let new_vector = vector.unwrap_or(existing.vector);
        let new_metadata = metadata.unwrap_or(existing.metadata);
        self.add(id.to_string(), new_vector, new_metadata).await?;
        Ok(true)
    }

    async fn count(&self, metadata_filter: Option<&VectorMetadata>) -> Result<usize, VectorStoreError> {
        let filter = metadata_filter.map(Self::build_filter);
        let mut builder = qdrant_client::qdrant::CountPointsBuilder::new(&self.collection);
        if let Some(filter) = filter {
            builder = builder.filter(filter);
        }
        let response = self.client.count(builder).await?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}
