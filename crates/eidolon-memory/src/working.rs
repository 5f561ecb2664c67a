//! Working memory - the bounded short-term buffer.
//!
//! Volatile, 7±2 items, salience decays each turn. Eviction removes the
//! item with the lowest effective salience, but never the current turn's
//! anchor item. Lost on restart by design.

use crate::embedding::Embedding;
use chrono::{DateTime, Utc};
use tracing::debug;

/// One item held in working memory.
#[derive(Debug, Clone)]
pub struct WorkingItem {
    pub item_id: u64,
    pub content: String,
    pub salience: f32,
    pub inserted_at: DateTime<Utc>,
    pub ttl_remaining: f32,
    pub current_turn: bool,
    pub embedding: Embedding,
}

impl WorkingItem {
    /// Salience discounted by age: the older an unrefreshed item, the less
    /// it holds the buffer.
    pub fn effective_salience(&self, now: DateTime<Utc>) -> f32 {
        let age_minutes = (now - self.inserted_at).num_seconds().max(0) as f32 / 60.0;
        self.salience * (-0.05 * age_minutes).exp()
    }
}

/// The bounded buffer. Capacity is the soft target; the hard cap is
/// capacity + 2, never more than 9 live items.
pub struct WorkingMemory {
    items: Vec<WorkingItem>,
    capacity: usize,
    decay_factor: f32,
    next_id: u64,
    default_ttl_secs: f32,
}

impl WorkingMemory {
    pub fn new(capacity: usize, decay_factor: f32) -> Self {
        Self {
            items: Vec::new(),
            capacity: capacity.min(9),
            decay_factor,
            next_id: 0,
            default_ttl_secs: 3600.0,
        }
    }

    pub fn hard_cap(&self) -> usize {
        (self.capacity + 2).min(9)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert an item; evict the weakest non-anchor item when over the cap.
    pub fn admit(
        &mut self,
        content: impl Into<String>,
        salience: f32,
        embedding: Embedding,
        current_turn: bool,
        now: DateTime<Utc>,
    ) -> u64 {
        let item_id = self.next_id;
        self.next_id += 1;
        self.items.push(WorkingItem {
            item_id,
            content: content.into(),
            salience: salience.clamp(0.0, 1.0),
            inserted_at: now,
            ttl_remaining: self.default_ttl_secs,
            current_turn,
            embedding,
        });

        while self.items.len() > self.hard_cap() {
            let evict_idx = self
                .items
                .iter()
                .enumerate()
                .filter(|(_, item)| !item.current_turn)
                .min_by(|(_, a), (_, b)| {
                    a.effective_salience(now)
                        .partial_cmp(&b.effective_salience(now))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i);
            match evict_idx {
                Some(i) => {
                    let evicted = self.items.remove(i);
                    debug!(item_id = evicted.item_id, "working memory evicted item");
                }
                // Everything is anchored to this turn; drop the oldest anyway
                // to honor the hard cap.
                None => {
                    self.items.remove(0);
                }
            }
        }
        item_id
    }

    /// Per-turn decay: multiply salience, drain TTL, drop the expired.
    pub fn decay(&mut self, elapsed_secs: f32) {
        for item in &mut self.items {
            item.salience *= self.decay_factor;
            item.ttl_remaining -= elapsed_secs;
        }
        self.items
            .retain(|item| item.ttl_remaining > 0.0 && item.salience > 0.01);
    }

    /// Clear the current-turn anchors once the turn has committed.
    pub fn release_turn_anchors(&mut self) {
        for item in &mut self.items {
            item.current_turn = false;
        }
    }

    /// The top-n items by effective salience.
    pub fn focus(&self, n: usize, now: DateTime<Utc>) -> Vec<&WorkingItem> {
        let mut sorted: Vec<&WorkingItem> = self.items.iter().collect();
        sorted.sort_by(|a, b| {
            b.effective_salience(now)
                .partial_cmp(&a.effective_salience(now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted.truncate(n);
        sorted
    }

    /// Best similarity between the query and any focused item, with the item.
    pub fn best_relation(&self, query: &Embedding, now: DateTime<Utc>) -> Option<(f32, &WorkingItem)> {
        self.focus(self.capacity, now)
            .into_iter()
            .map(|item| (query.cosine_similarity(&item.embedding).max(0.0), item))
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wm() -> WorkingMemory {
        WorkingMemory::new(7, 0.9)
    }

    fn emb(v: Vec<f32>) -> Embedding {
        Embedding(v)
    }

    #[test]
    fn hard_cap_is_never_exceeded() {
        let mut m = wm();
        let now = Utc::now();
        for i in 0..20 {
            m.admit(format!("item {i}"), 0.5, emb(vec![1.0, 0.0]), false, now);
            assert!(m.len() <= 9);
        }
        assert_eq!(m.len(), 9);
    }

    #[test]
    fn eviction_removes_lowest_salience() {
        let mut m = wm();
        let now = Utc::now();
        m.admit("weak", 0.05, emb(vec![1.0]), false, now);
        for i in 0..9 {
            m.admit(format!("strong {i}"), 0.9, emb(vec![1.0]), false, now);
        }
        assert!(m.focus(9, now).iter().all(|item| item.content != "weak"));
    }

    #[test]
    fn current_turn_anchor_survives_eviction() {
        let mut m = wm();
        let now = Utc::now();
        m.admit("anchor", 0.01, emb(vec![1.0]), true, now);
        for i in 0..12 {
            m.admit(format!("filler {i}"), 0.9, emb(vec![1.0]), false, now);
        }
        assert!(m
            .focus(9, now)
            .iter()
            .any(|item| item.content == "anchor"));
    }

    #[test]
    fn decay_shrinks_salience_and_drops_expired() {
        let mut m = wm();
        let now = Utc::now();
        m.admit("a", 0.5, emb(vec![1.0]), false, now);
        m.decay(0.0);
        let salience = m.focus(1, now)[0].salience;
        assert!((salience - 0.45).abs() < 1e-6);

        // Drain TTL entirely.
        m.decay(10_000.0);
        assert!(m.is_empty());
    }

    #[test]
    fn focus_orders_by_effective_salience() {
        let mut m = wm();
        let now = Utc::now();
        m.admit("low", 0.2, emb(vec![1.0]), false, now);
        m.admit("high", 0.9, emb(vec![1.0]), false, now);
        m.admit("mid", 0.5, emb(vec![1.0]), false, now);
        let focused = m.focus(2, now);
        assert_eq!(focused[0].content, "high");
        assert_eq!(focused[1].content, "mid");
    }

    #[test]
    fn best_relation_finds_the_similar_item() {
        let mut m = wm();
        let now = Utc::now();
        m.admit("about the sea", 0.5, emb(vec![1.0, 0.0]), false, now);
        m.admit("about the sky", 0.5, emb(vec![0.0, 1.0]), false, now);
        let (sim, item) = m.best_relation(&emb(vec![1.0, 0.0]), now).unwrap();
        assert!(sim > 0.99);
        assert_eq!(item.content, "about the sea");
    }
}
