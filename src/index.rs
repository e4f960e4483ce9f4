//! Approximate nearest-neighbor index over cosine space
//!
//! Thin wrapper around an HNSW graph. Ids are assigned in insertion order
//! and line up with the retrieval engine's parallel chunk and metadata
//! arrays; the index is rebuilt from scratch on every ingest, never
//! mutated in place.

use crate::error::{Result, RetrievalError};
use hnsw_rs::prelude::*;

/// Graph connectivity (`M`)
const MAX_NB_CONNECTION: usize = 48;

/// Maximum graph layer count
const MAX_LAYER: usize = 16;

/// Construction-time candidate list size
const EF_CONSTRUCTION: usize = 200;

/// Query-time candidate list size controlling recall
const EF_SEARCH: usize = 50;

/// Default index capacity
pub const DEFAULT_CAPACITY: usize = 10_000;

/// A single nearest-neighbor hit: insertion-order id and cosine distance
/// in `[0, 2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: usize,
    pub distance: f32,
}

/// HNSW index over cosine distance with insertion-order ids
pub struct VectorIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    dimension: usize,
    len: usize,
    ef_search: usize,
}

impl VectorIndex {
    pub fn new(dimension: usize, capacity: usize) -> Self {
        let hnsw = Hnsw::new(
            MAX_NB_CONNECTION,
            capacity.max(1),
            MAX_LAYER,
            EF_CONSTRUCTION,
            DistCosine {},
        );
        Self {
            hnsw,
            dimension,
            len: 0,
            ef_search: EF_SEARCH,
        }
    }

    pub fn with_default_capacity(dimension: usize) -> Self {
        Self::new(dimension, DEFAULT_CAPACITY)
    }

    /// Append vectors; ids are assigned sequentially starting at the
    /// current length.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(RetrievalError::InvalidDimension {
                    expected: self.dimension,
                    actual: vector.len(),
                }
                .into());
            }
        }

        let batch: Vec<(&Vec<f32>, usize)> = vectors
            .iter()
            .enumerate()
            .map(|(offset, vector)| (vector, self.len + offset))
            .collect();
        self.hnsw.parallel_insert(&batch);
        self.len += vectors.len();
        Ok(())
    }

    /// Tune the query-time candidate list size
    pub fn set_ef(&mut self, ef: usize) {
        self.ef_search = ef.max(1);
    }

    /// Return up to `k` nearest neighbors of `query`, closest first.
    pub fn knn(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dimension {
            return Err(RetrievalError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            }
            .into());
        }
        if self.len == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let ef = self.ef_search.max(k);
        let mut hits: Vec<Hit> = self
            .hnsw
            .search(query, k.min(self.len), ef)
            .into_iter()
            .map(|neighbour| Hit {
                id: neighbour.d_id,
                distance: neighbour.distance,
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
