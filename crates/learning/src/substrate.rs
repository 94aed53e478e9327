//! Learning substrate
//!
//! Wraps the vector index with typed pattern collections and reinforcement
//! semantics. Reinforcement is recomputed on every stat update and cached
//! in the record, never at query time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use finsight_core::{PatternKind, PatternMetadata, PatternRecord, PatternStats, Record};

use crate::adaptive::AdaptiveHandle;
use crate::embeddings::Embedder;
use crate::signature::canonical_signature;
use crate::vector_store::{VectorIndex, VectorPoint};
use crate::LearningError;

/// Substrate tuning.
#[derive(Debug, Clone)]
pub struct SubstrateConfig {
    /// Embedding dimension, fixed per deployment.
    pub vector_dim: usize,
    /// Candidates fetched per `best_of` before reweighting.
    pub query_top_k: usize,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            vector_dim: finsight_config::constants::vectors::EMBEDDING_DIM,
            query_top_k: 16,
        }
    }
}

/// A retrieved pattern with its query similarity.
#[derive(Debug, Clone)]
pub struct ScoredPattern {
    pub record: PatternRecord,
    pub similarity: f32,
}

/// Write capability handed to the quality engine.
#[async_trait]
pub trait PatternWriter: Send + Sync {
    /// Append a complete record. Idempotent on id.
    async fn append(&self, record: PatternRecord) -> Result<(), LearningError>;

    /// Fold one interaction into an existing record's stats.
    async fn reinforce(
        &self,
        kind: PatternKind,
        id: Uuid,
        approved: bool,
        overall_score: Option<f64>,
    ) -> Result<(), LearningError>;
}

/// Read capability: similarity retrieval over a typed collection.
#[async_trait]
pub trait PatternSearch: Send + Sync {
    /// The record maximizing `similarity * reinforcement` among candidates
    /// at or above `min_similarity`. Ties break to the newer
    /// `last_used_at`, then the lower id.
    async fn best_of(
        &self,
        kind: PatternKind,
        vector: &[f32],
        min_similarity: f32,
    ) -> Result<Option<ScoredPattern>, LearningError>;

    /// Top-k by raw similarity, unweighted. Analytics path.
    async fn similar(
        &self,
        kind: PatternKind,
        vector: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredPattern>, LearningError>;
}

/// The substrate. Owns pattern records after append; everyone else holds
/// ids.
pub struct LearningSubstrate {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<Embedder>,
    adaptive: AdaptiveHandle,
    config: SubstrateConfig,
    /// Per-id write serialization. Guards read-modify-write of stats so
    /// `uses` stays monotonic under concurrent updates.
    id_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl LearningSubstrate {
    /// Build the substrate and create every typed collection.
    pub async fn init(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<Embedder>,
        adaptive: AdaptiveHandle,
        config: SubstrateConfig,
    ) -> Result<Self, LearningError> {
        for kind in PatternKind::all() {
            index
                .ensure_collection(kind.collection_name(), config.vector_dim)
                .await?;
        }

        Ok(Self {
            index,
            embedder,
            adaptive,
            config,
            id_locks: DashMap::new(),
        })
    }

    pub fn adaptive(&self) -> &AdaptiveHandle {
        &self.adaptive
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// True when the keyed-hash fallback embedder is active.
    pub fn embedder_is_fallback(&self) -> bool {
        self.embedder.is_fallback()
    }

    /// Canonicalize and embed a record's signature. The embedder can be
    /// CPU-heavy, so it runs off the request path on the blocking pool.
    pub async fn signature_vector(&self, record: &Record) -> Result<Vec<f32>, LearningError> {
        let signature = canonical_signature(record);
        let embedder = self.embedder.clone();
        tokio::task::spawn_blocking(move || embedder.embed(&signature))
            .await
            .map_err(|e| LearningError::Embedding(format!("embedder task failed: {}", e)))?
    }

    /// Record a completed interaction as a new pattern.
    pub async fn record(
        &self,
        kind: PatternKind,
        signature_vector: Vec<f32>,
        payload: String,
        metadata: PatternMetadata,
        approved: bool,
        overall_score: f64,
    ) -> Result<PatternRecord, LearningError> {
        let stats = PatternStats::initial(approved, overall_score, Utc::now());
        let record = PatternRecord::new(kind, signature_vector, payload, metadata, stats);
        self.append(record.clone()).await?;
        Ok(record)
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.id_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn parse_record(payload: &str) -> Result<PatternRecord, LearningError> {
        serde_json::from_str(payload).map_err(|e| LearningError::InvalidData(e.to_string()))
    }

    fn serialize_record(record: &PatternRecord) -> Result<String, LearningError> {
        serde_json::to_string(record).map_err(|e| LearningError::InvalidData(e.to_string()))
    }
}

#[async_trait]
impl PatternWriter for LearningSubstrate {
    async fn append(&self, record: PatternRecord) -> Result<(), LearningError> {
        let point = VectorPoint {
            id: record.id,
            vector: record.signature_vector.clone(),
            payload: Self::serialize_record(&record)?,
        };
        self.index
            .upsert(record.kind.collection_name(), point)
            .await?;

        tracing::debug!(
            id = %record.id,
            kind = %record.kind,
            reinforcement = record.reinforcement,
            "Pattern recorded"
        );
        Ok(())
    }

    async fn reinforce(
        &self,
        kind: PatternKind,
        id: Uuid,
        approved: bool,
        overall_score: Option<f64>,
    ) -> Result<(), LearningError> {
        // Per-id serialization for the read-modify-write; last writer wins
        // at the index, stats only ever move forward.
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let hit = self
            .index
            .get(kind.collection_name(), id)
            .await?
            .ok_or_else(|| LearningError::NotFound(format!("pattern {}", id)))?;

        let mut record = Self::parse_record(&hit.payload)?;
        let now = Utc::now();
        record.stats.register_use(approved, overall_score, now);
        record.refresh_reinforcement(now);

        let point = VectorPoint {
            id: record.id,
            vector: record.signature_vector.clone(),
            payload: Self::serialize_record(&record)?,
        };
        self.index.upsert(kind.collection_name(), point).await?;
        Ok(())
    }
}

#[async_trait]
impl PatternSearch for LearningSubstrate {
    async fn best_of(
        &self,
        kind: PatternKind,
        vector: &[f32],
        min_similarity: f32,
    ) -> Result<Option<ScoredPattern>, LearningError> {
        let hits = self
            .index
            .query(
                kind.collection_name(),
                vector,
                self.config.query_top_k,
                min_similarity,
            )
            .await?;

        let mut best: Option<ScoredPattern> = None;
        for hit in hits {
            let record = match Self::parse_record(&hit.payload) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(id = %hit.id, error = %e, "Skipping unparseable pattern");
                    continue;
                },
            };
            let candidate = ScoredPattern {
                similarity: hit.score,
                record,
            };

            best = Some(match best.take() {
                None => candidate,
                Some(current) => {
                    let current_weight =
                        current.similarity as f64 * current.record.reinforcement;
                    let candidate_weight =
                        candidate.similarity as f64 * candidate.record.reinforcement;
                    if candidate_weight > current_weight {
                        candidate
                    } else if candidate_weight < current_weight {
                        current
                    } else if candidate.record.tie_break(&current.record)
                        == std::cmp::Ordering::Less
                    {
                        candidate
                    } else {
                        current
                    }
                },
            });
        }

        Ok(best)
    }

    async fn similar(
        &self,
        kind: PatternKind,
        vector: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredPattern>, LearningError> {
        let hits = self
            .index
            .query(kind.collection_name(), vector, k, min_similarity)
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                Self::parse_record(&hit.payload)
                    .map(|record| ScoredPattern {
                        similarity: hit.score,
                        record,
                    })
                    .ok()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::AdaptiveHandle;
    use crate::vector_store::MemoryIndex;
    use serde_json::json;

    async fn substrate() -> LearningSubstrate {
        LearningSubstrate::init(
            Arc::new(MemoryIndex::new()),
            Arc::new(Embedder::hash(64)),
            AdaptiveHandle::spawn(finsight_config::AdaptiveConfig::default()),
            SubstrateConfig {
                vector_dim: 64,
                query_top_k: 16,
            },
        )
        .await
        .unwrap()
    }

    fn metadata() -> PatternMetadata {
        PatternMetadata {
            context: "banking".to_string(),
            data_type: "base_prompt".to_string(),
            domain: "transactions".to_string(),
        }
    }

    #[tokio::test]
    async fn test_signature_vector_deterministic() {
        let s = substrate().await;
        let record = Record::new(json!({"customer": "CUST_aa", "amount": 5000}));
        let a = s.signature_vector(&record).await.unwrap();
        let b = s.signature_vector(&record).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_stored_pattern_retrieved_at_unit_similarity() {
        // Cache monotonicity: an appended pattern comes back at
        // similarity 1.0 for the identical canonical signature.
        let s = substrate().await;
        let record = Record::new(json!({"customer": "CUST_aa", "amount": 5000}));
        let vector = s.signature_vector(&record).await.unwrap();

        s.record(
            PatternKind::Prompt,
            vector.clone(),
            "stored prompt".to_string(),
            metadata(),
            true,
            0.9,
        )
        .await
        .unwrap();

        let hit = s
            .best_of(PatternKind::Prompt, &vector, 0.8)
            .await
            .unwrap()
            .expect("pattern should be retrievable");
        assert!(hit.similarity > 0.999);
        assert_eq!(hit.record.payload, "stored prompt");
    }

    #[tokio::test]
    async fn test_best_of_weighs_reinforcement() {
        let s = substrate().await;
        let record = Record::new(json!({"k": "v"}));
        let vector = s.signature_vector(&record).await.unwrap();

        let weak = s
            .record(
                PatternKind::Prompt,
                vector.clone(),
                "weak".to_string(),
                metadata(),
                false,
                0.2,
            )
            .await
            .unwrap();
        let strong = s
            .record(
                PatternKind::Prompt,
                vector.clone(),
                "strong".to_string(),
                metadata(),
                true,
                0.95,
            )
            .await
            .unwrap();

        let best = s
            .best_of(PatternKind::Prompt, &vector, 0.5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.record.id, strong.id);
        assert_ne!(best.record.id, weak.id);
    }

    #[tokio::test]
    async fn test_reinforce_updates_stats_and_cache() {
        let s = substrate().await;
        let record = Record::new(json!({"k": "v"}));
        let vector = s.signature_vector(&record).await.unwrap();

        let stored = s
            .record(
                PatternKind::Prompt,
                vector.clone(),
                "p".to_string(),
                metadata(),
                false,
                0.3,
            )
            .await
            .unwrap();
        let before = stored.reinforcement;

        for _ in 0..5 {
            s.reinforce(PatternKind::Prompt, stored.id, true, Some(0.95))
                .await
                .unwrap();
        }

        let after = s
            .best_of(PatternKind::Prompt, &vector, 0.5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.record.stats.uses, 6);
        assert_eq!(after.record.stats.successes, 5);
        assert!(after.record.reinforcement > before);
    }

    #[tokio::test]
    async fn test_reinforce_missing_pattern() {
        let s = substrate().await;
        let err = s
            .reinforce(PatternKind::Prompt, Uuid::new_v4(), true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LearningError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_reinforce_stays_monotonic() {
        let s = Arc::new(substrate().await);
        let record = Record::new(json!({"k": "v"}));
        let vector = s.signature_vector(&record).await.unwrap();

        let stored = s
            .record(
                PatternKind::Prompt,
                vector.clone(),
                "p".to_string(),
                metadata(),
                true,
                0.8,
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = s.clone();
            let id = stored.id;
            handles.push(tokio::spawn(async move {
                s.reinforce(PatternKind::Prompt, id, true, Some(0.9)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let after = s
            .best_of(PatternKind::Prompt, &vector, 0.5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.record.stats.uses, 17);
    }

    #[tokio::test]
    async fn test_similar_is_unweighted() {
        let s = substrate().await;
        let record = Record::new(json!({"k": "v"}));
        let vector = s.signature_vector(&record).await.unwrap();

        for (payload, approved) in [("a", true), ("b", false)] {
            s.record(
                PatternKind::Analysis,
                vector.clone(),
                payload.to_string(),
                metadata(),
                approved,
                0.5,
            )
            .await
            .unwrap();
        }

        let similar = s
            .similar(PatternKind::Analysis, &vector, 10, 0.5)
            .await
            .unwrap();
        assert_eq!(similar.len(), 2);
    }
}
