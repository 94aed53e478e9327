//! Learning / cache substrate
//!
//! Features:
//! - Vector index adapter over Qdrant with an in-memory linear-scan fallback
//! - Deterministic signature canonicalization and embedding
//! - Typed pattern collections with reinforcement-weighted retrieval
//! - Temporal decay with optional age-based cleanup
//! - Process-wide adaptive thresholds behind a single-writer feedback task

pub mod adaptive;
pub mod decay;
pub mod embeddings;
pub mod signature;
pub mod substrate;
pub mod vector_store;

pub use adaptive::{AdaptiveHandle, AdaptiveSnapshot, FeedbackEvent};
pub use decay::{spawn_decay_task, DecayReport};
pub use embeddings::{Embedder, HashEmbedder};
pub use signature::canonical_signature;
pub use substrate::{
    LearningSubstrate, PatternSearch, PatternWriter, ScoredPattern, SubstrateConfig,
};
pub use vector_store::{MemoryIndex, QdrantIndex, VectorHit, VectorIndex, VectorPoint};

use thiserror::Error;

/// Learning substrate errors
#[derive(Error, Debug)]
pub enum LearningError {
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<LearningError> for finsight_core::Error {
    fn from(err: LearningError) -> Self {
        finsight_core::Error::dependency("vector_index", err.to_string())
    }
}
