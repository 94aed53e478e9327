//! Vector index adapter
//!
//! Thin interface over a cosine-similarity index. The Qdrant implementation
//! is the durable path; the in-memory implementation is the explicit
//! fallback for the current process lifetime when the index is unreachable.

use async_trait::async_trait;
use dashmap::DashMap;
use qdrant_client::{
    qdrant::{
        value::Kind, CreateCollectionBuilder, DeletePointsBuilder, Distance, GetPointsBuilder,
        PointId, PointStruct, PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder,
        UpsertPointsBuilder, VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::LearningError;

/// A point to upsert: id, embedding, and an opaque JSON payload stored
/// alongside.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: String,
}

/// One query hit, sorted by descending cosine score.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: String,
}

/// Cosine-similarity index over named collections. Upserts are idempotent
/// on id; queries are read-committed relative to completed upserts.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection with the given dimension if missing. The
    /// dimension is fixed at creation.
    async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<(), LearningError>;

    async fn upsert(&self, collection: &str, point: VectorPoint) -> Result<(), LearningError>;

    /// Top-k by cosine similarity, descending, filtered at `min_score`.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>, LearningError>;

    /// Fetch a single point's payload by id.
    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<VectorHit>, LearningError>;

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), LearningError>;

    /// Page through a collection (for decay sweeps).
    async fn list(&self, collection: &str, limit: usize) -> Result<Vec<VectorHit>, LearningError>;

    /// Liveness probe for /health.
    async fn ping(&self) -> bool;

    /// Adapter name surfaced in /health.
    fn backend(&self) -> &'static str;
}

const PAYLOAD_KEY: &str = "record";

/// Qdrant-backed index.
pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    /// Connect to Qdrant, optionally authenticated.
    pub fn connect(endpoint: &str, api_key: Option<&str>) -> Result<Self, LearningError> {
        let mut builder = Qdrant::from_url(endpoint);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
            tracing::info!("Qdrant connection using API key authentication");
        }
        let client = builder
            .build()
            .map_err(|e| LearningError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    fn hit_from_payload(
        id: Option<PointId>,
        score: f32,
        payload: HashMap<String, qdrant_client::qdrant::Value>,
    ) -> Option<VectorHit> {
        let id = id.and_then(|pid| match pid.point_id_options {
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => {
                Uuid::parse_str(&u).ok()
            },
            _ => None,
        })?;

        let record = payload.get(PAYLOAD_KEY).and_then(|v| match &v.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })?;

        Some(VectorHit {
            id,
            score,
            payload: record,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<(), LearningError> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| LearningError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(collection).vectors_config(
                        VectorParamsBuilder::new(dim as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| LearningError::VectorStore(e.to_string()))?;
            tracing::info!(collection, dim, "Created vector collection");
        }

        Ok(())
    }

    async fn upsert(&self, collection: &str, point: VectorPoint) -> Result<(), LearningError> {
        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert(PAYLOAD_KEY.to_string(), point.payload.into());

        let qdrant_point = PointStruct::new(point.id.to_string(), point.vector, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![qdrant_point]))
            .await
            .map_err(|e| LearningError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>, LearningError> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector.to_vec(), top_k as u64)
                    .with_payload(true)
                    .score_threshold(min_score),
            )
            .await
            .map_err(|e| LearningError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|p| Self::hit_from_payload(p.id, p.score, p.payload))
            .collect())
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<VectorHit>, LearningError> {
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(
                    collection,
                    vec![PointId::from(id.to_string())],
                )
                .with_payload(true),
            )
            .await
            .map_err(|e| LearningError::VectorStore(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .and_then(|p| Self::hit_from_payload(p.id, 1.0, p.payload)))
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), LearningError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection).points(PointsIdsList {
                    ids: vec![PointId::from(id.to_string())],
                }),
            )
            .await
            .map_err(|e| LearningError::VectorStore(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, collection: &str, limit: usize) -> Result<Vec<VectorHit>, LearningError> {
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collection)
                    .limit(limit as u32)
                    .with_payload(true),
            )
            .await
            .map_err(|e| LearningError::VectorStore(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|p| Self::hit_from_payload(p.id, 1.0, p.payload))
            .collect())
    }

    async fn ping(&self) -> bool {
        self.client.health_check().await.is_ok()
    }

    fn backend(&self) -> &'static str {
        "qdrant"
    }
}

/// In-memory fallback with linear-scan cosine similarity. Callers tolerate
/// higher latency while this adapter is active.
#[derive(Default)]
pub struct MemoryIndex {
    collections: DashMap<String, DashMap<Uuid, (Vec<f32>, String)>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(&self, collection: &str, _dim: usize) -> Result<(), LearningError> {
        self.collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, collection: &str, point: VectorPoint) -> Result<(), LearningError> {
        let entry = self.collections.entry(collection.to_string()).or_default();
        entry.insert(point.id, (point.vector, point.payload));
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>, LearningError> {
        let Some(entry) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<VectorHit> = entry
            .iter()
            .filter_map(|item| {
                let (stored_vector, payload) = item.value();
                let score = Self::cosine(vector, stored_vector);
                if score >= min_score {
                    Some(VectorHit {
                        id: *item.key(),
                        score,
                        payload: payload.clone(),
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<VectorHit>, LearningError> {
        Ok(self.collections.get(collection).and_then(|entry| {
            entry.get(&id).map(|stored| VectorHit {
                id,
                score: 1.0,
                payload: stored.value().1.clone(),
            })
        }))
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), LearningError> {
        if let Some(entry) = self.collections.get(collection) {
            entry.remove(&id);
        }
        Ok(())
    }

    async fn list(&self, collection: &str, limit: usize) -> Result<Vec<VectorHit>, LearningError> {
        let Some(entry) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(entry
            .iter()
            .take(limit)
            .map(|item| VectorHit {
                id: *item.key(),
                score: 1.0,
                payload: item.value().1.clone(),
            })
            .collect())
    }

    async fn ping(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: Uuid, vector: Vec<f32>, payload: &str) -> VectorPoint {
        VectorPoint {
            id,
            vector,
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_upsert_is_idempotent() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 3).await.unwrap();

        let id = Uuid::new_v4();
        index.upsert("c", point(id, vec![1.0, 0.0, 0.0], "a")).await.unwrap();
        index.upsert("c", point(id, vec![1.0, 0.0, 0.0], "a")).await.unwrap();

        let hits = index.query("c", &[1.0, 0.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload, "a");
    }

    #[tokio::test]
    async fn test_memory_query_sorted_descending() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2).await.unwrap();

        index
            .upsert("c", point(Uuid::new_v4(), vec![1.0, 0.0], "exact"))
            .await
            .unwrap();
        index
            .upsert("c", point(Uuid::new_v4(), vec![0.7, 0.7], "diagonal"))
            .await
            .unwrap();
        index
            .upsert("c", point(Uuid::new_v4(), vec![0.0, 1.0], "orthogonal"))
            .await
            .unwrap();

        let hits = index.query("c", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].payload, "exact");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[tokio::test]
    async fn test_memory_min_score_filters() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2).await.unwrap();
        index
            .upsert("c", point(Uuid::new_v4(), vec![0.0, 1.0], "orthogonal"))
            .await
            .unwrap();

        let hits = index.query("c", &[1.0, 0.0], 10, 0.5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_memory_get_and_delete() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2).await.unwrap();

        let id = Uuid::new_v4();
        index.upsert("c", point(id, vec![1.0, 0.0], "x")).await.unwrap();
        assert!(index.get("c", id).await.unwrap().is_some());

        index.delete("c", id).await.unwrap();
        assert!(index.get("c", id).await.unwrap().is_none());
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(MemoryIndex::cosine(&[], &[]), 0.0);
        assert_eq!(MemoryIndex::cosine(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(MemoryIndex::cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
