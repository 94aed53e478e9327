//! Signature embeddings
//!
//! The embedder is deterministic: identical input text yields an identical
//! vector. The ONNX path is feature-gated; the default build uses the
//! keyed-hash embedder, which keeps similarity retrieval meaningful for
//! byte-identical signatures and is surfaced as `embedder=fallback`.

use sha2::{Digest, Sha256};

#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

use crate::LearningError;

/// Deterministic hash-based embedder with the deployment dimensionality.
///
/// Counter-mode SHA-256 expansion of the input, normalized to unit length.
/// Not semantically meaningful, but byte-identical inputs map to identical
/// vectors, which is what exact-signature retrieval needs.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dim];
        let mut filled = 0;
        let mut counter: u32 = 0;

        while filled < self.dim {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_le_bytes());
            hasher.update(text.as_bytes());
            let digest = hasher.finalize();

            for chunk in digest.chunks(4) {
                if filled >= self.dim {
                    break;
                }
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Map to [-1, 1)
                embedding[filled] = (bits as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32;
                filled += 1;
            }
            counter += 1;
        }

        normalize(&mut embedding);
        embedding
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

fn normalize(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in embedding.iter_mut() {
            *v /= norm;
        }
    }
}

/// ONNX sentence embedder (mean pooling over the last hidden state).
#[cfg(feature = "onnx")]
pub struct OnnxEmbedder {
    session: Session,
    tokenizer: Tokenizer,
    dim: usize,
    max_seq_len: usize,
}

#[cfg(feature = "onnx")]
impl OnnxEmbedder {
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        dim: usize,
    ) -> Result<Self, LearningError> {
        let session = Session::builder()
            .map_err(|e| LearningError::Embedding(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| LearningError::Embedding(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| LearningError::Embedding(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| LearningError::Embedding(e.to_string()))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| LearningError::Embedding(e.to_string()))?;

        Ok(Self {
            session,
            tokenizer,
            dim,
            max_seq_len: 512,
        })
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>, LearningError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| LearningError::Embedding(e.to_string()))?;

        let len = encoding.get_ids().len().min(self.max_seq_len);
        let mut input_ids = vec![0i64; self.max_seq_len];
        let mut attention_mask = vec![0i64; self.max_seq_len];
        let mut token_type_ids = vec![0i64; self.max_seq_len];

        for i in 0..len {
            input_ids[i] = encoding.get_ids()[i] as i64;
            attention_mask[i] = encoding.get_attention_mask()[i] as i64;
            token_type_ids[i] = encoding.get_type_ids()[i] as i64;
        }

        let to_tensor = |data: Vec<i64>| {
            Array2::from_shape_vec((1, self.max_seq_len), data)
                .map_err(|e| LearningError::Embedding(e.to_string()))
                .and_then(|a| {
                    Tensor::from_array(a).map_err(|e| LearningError::Embedding(e.to_string()))
                })
        };

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => to_tensor(input_ids)?,
                "attention_mask" => to_tensor(attention_mask)?,
                "token_type_ids" => to_tensor(token_type_ids)?,
            ])
            .map_err(|e| LearningError::Embedding(e.to_string()))?;

        let (shape, data) = outputs
            .get("last_hidden_state")
            .ok_or_else(|| LearningError::Embedding("missing output tensor".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| LearningError::Embedding(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 3 {
            return Err(LearningError::Embedding(format!(
                "unexpected tensor shape: {:?}",
                dims
            )));
        }
        let (seq_len, hidden) = (dims[1], dims[2]);

        let mut embedding = vec![0.0f32; self.dim];
        let pooled = len.min(seq_len);
        for j in 0..pooled {
            for k in 0..self.dim.min(hidden) {
                embedding[k] += data[j * hidden + k];
            }
        }
        for v in &mut embedding {
            *v /= pooled.max(1) as f32;
        }

        normalize(&mut embedding);
        Ok(embedding)
    }
}

/// The embedder selected at startup. The fallback flag is carried into
/// provenance and /health.
pub enum Embedder {
    #[cfg(feature = "onnx")]
    Onnx(OnnxEmbedder),
    Hash(HashEmbedder),
}

impl Embedder {
    pub fn hash(dim: usize) -> Self {
        Embedder::Hash(HashEmbedder::new(dim))
    }

    /// Load the ONNX sentence embedder. Callers fall back to
    /// [`Embedder::hash`] when loading fails.
    #[cfg(feature = "onnx")]
    pub fn onnx(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        dim: usize,
    ) -> Result<Self, LearningError> {
        Ok(Embedder::Onnx(OnnxEmbedder::new(
            model_path,
            tokenizer_path,
            dim,
        )?))
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>, LearningError> {
        match self {
            #[cfg(feature = "onnx")]
            Embedder::Onnx(inner) => inner.embed(text),
            Embedder::Hash(inner) => Ok(inner.embed(text)),
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            #[cfg(feature = "onnx")]
            Embedder::Onnx(inner) => inner.dim,
            Embedder::Hash(inner) => inner.dim(),
        }
    }

    /// True when the keyed-hash pseudo-embedding is active.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Embedder::Hash(_))
    }
}
