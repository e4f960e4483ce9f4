//! Sentence embeddings for the retrieval engine
//!
//! The gateway embeds chunks and queries with AllMiniLM-L6-v2 (384
//! dimensions) via fastembed. A deterministic hashing encoder is available
//! as a fallback for environments where the ONNX model cannot be fetched;
//! it keeps the same dimensionality and unit-norm contract so the rest of
//! the pipeline is agnostic to the encoder in use.

use crate::error::{Result, RetrievalError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// Dimensionality of all embeddings produced by this module
pub const EMBEDDING_DIM: usize = 384;

/// Produces unit-normalized dense vectors for batches of text.
///
/// Implementations must return one vector per input text, each of
/// [`EMBEDDING_DIM`] length with an L2 norm of 1.
pub trait Embedder: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// AllMiniLM-L6-v2 encoder backed by fastembed.
///
/// The model download (~90 MB on first use) and inference are blocking;
/// callers dispatch `encode` through a worker pool. The model handle is
/// mutex-guarded so the encoder is `Sync`.
pub struct MiniLmEmbedder {
    model: Mutex<TextEmbedding>,
}

impl MiniLmEmbedder {
    /// Load the embedding model, downloading it on first use.
    pub fn load() -> Result<Self> {
        tracing::info!("loading AllMiniLM-L6-v2 embedding model");
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;
        tracing::info!("embedding model ready");
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl Embedder for MiniLmEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| RetrievalError::EmbeddingFailed("embedding model poisoned".to_string()))?;
        let mut embeddings = model
            .embed(texts.to_vec(), None)
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        for embedding in &mut embeddings {
            if embedding.len() != EMBEDDING_DIM {
                return Err(RetrievalError::InvalidDimension {
                    expected: EMBEDDING_DIM,
                    actual: embedding.len(),
                }
                .into());
            }
            l2_normalize(embedding);
        }

        Ok(embeddings)
    }
}

/// Deterministic bag-of-words hashing encoder.
///
/// Each whitespace token is hashed into one of the 384 dimensions; the
/// resulting count vector is L2-normalized. Texts sharing tokens land close
/// in cosine space, which is enough for exercising the retrieval pipeline
/// without the ONNX model.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; EMBEDDING_DIM];
                for token in text.split_whitespace() {
                    let token: String = token
                        .chars()
                        .filter(|c| c.is_alphanumeric())
                        .flat_map(char::to_lowercase)
                        .collect();
                    if token.is_empty() {
                        continue;
                    }
                    let mut hasher = DefaultHasher::new();
                    token.hash(&mut hasher);
                    let dim = (hasher.finish() as usize) % EMBEDDING_DIM;
                    vector[dim] += 1.0;
                }
                l2_normalize(&mut vector);
                vector
            })
            .collect())
    }
}
