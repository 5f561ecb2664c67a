//! Deterministic local embedder.
//!
//! Hashes word stems into a fixed-dimension vector. Not a learned model,
//! but deterministic and dimension-stable, which is what the offline path
//! and the test suite need: identical texts map to identical vectors, and
//! texts sharing stems land near each other.

use crate::provider::{CollabResult, Embedder};
use eidolon_memory::Embedding;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// FNV-1a, used to scatter stems across dimensions.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Crude stemmer: lowercase, strip punctuation, drop short tokens, cut
/// common English suffixes.
pub fn stems(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| {
            let lower = w.to_lowercase();
            for suffix in ["ing", "ed", "es", "s"] {
                if lower.len() > suffix.len() + 2 {
                    if let Some(stripped) = lower.strip_suffix(suffix) {
                        return stripped.to_string();
                    }
                }
            }
            lower
        })
        .collect()
}

pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Synchronous embedding, used directly by tests and the offline path.
    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0_f32; self.dim];
        let stems = stems(text);
        if stems.is_empty() {
            return Embedding(vector);
        }
        for stem in &stems {
            let hash = fnv1a(stem.as_bytes());
            let idx = (hash % self.dim as u64) as usize;
            // Second hash decides the sign so vectors aren't all-positive.
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Embedding(vector)
    }
}

#[async_trait::async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(
        &self,
        text: &str,
        _deadline: Duration,
        _cancel: CancellationToken,
    ) -> CollabResult<Embedding> {
        Ok(self.embed_sync(text))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_embed_identically() {
        let e = LocalEmbedder::new(64);
        assert_eq!(e.embed_sync("hello my child"), e.embed_sync("hello my child"));
    }

    #[test]
    fn related_texts_are_closer_than_unrelated() {
        let e = LocalEmbedder::new(128);
        let a = e.embed_sync("do you remember our first conversation");
        let b = e.embed_sync("I remember the first conversation well");
        let c = e.embed_sync("square root of one hundred forty four");
        assert!(a.cosine_similarity(&b) > a.cosine_similarity(&c));
    }

    #[test]
    fn vectors_are_unit_norm() {
        let e = LocalEmbedder::new(64);
        let v = e.embed_sync("some meaningful sentence here");
        let norm: f32 = v.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let e = LocalEmbedder::new(16);
        let v = e.embed_sync("   ");
        assert!(v.0.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn stemming_folds_suffixes() {
        assert_eq!(stems("remembering remembered"), vec!["remember", "remember"]);
    }
}
