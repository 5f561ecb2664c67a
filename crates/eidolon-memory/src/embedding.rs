//! Fixed-dimension embedding vectors for semantic similarity search.
//!
//! The embedder itself is a pluggable collaborator; this module only defines
//! the vector type, cosine similarity, and the BLOB encoding used by the
//! SQLite store (little-endian f32).

use serde::{Deserialize, Serialize};

/// A dense embedding vector. Every vector in a deployment has the same
/// dimension (`embedding_dim` in config, default 384).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// An all-zero vector of the given dimension.
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Cosine similarity. Returns 0.0 on dimension mismatch or if either
    /// vector has zero magnitude.
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom < f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Semantic distance in [0, 1]: 1 − max(cosine, 0).
    pub fn distance(&self, other: &Self) -> f32 {
        1.0 - self.cosine_similarity(other).max(0.0)
    }

    /// Encode as a little-endian f32 BLOB for storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Decode from a little-endian f32 BLOB. Trailing partial floats are
    /// ignored.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let floats = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self(floats)
    }
}
