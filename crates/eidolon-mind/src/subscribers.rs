//! Workspace subscribers backed by the memory stores.
//!
//! Each wraps a store and turns recall into a candidate thought with the
//! salience rules of its module.

use crate::workspace::{Subscriber, WorkspaceInput};
use chrono::Utc;
use eidolon_core::{EmotionKind, Thought, ThoughtSource};
use eidolon_memory::{EpisodicStore, SemanticStore, WorkingMemory};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

const EPISODIC_SIMILARITY_FLOOR: f32 = 0.7;
const EPISODIC_CREATOR_BONUS: f32 = 0.2;
const SEMANTIC_SIMILARITY_FLOOR: f32 = 0.6;
const WORKING_SIMILARITY_FLOOR: f32 = 0.5;

/// "This reminds me of..." — recalls the top-3 and proposes the best hit.
pub struct EpisodicSubscriber {
    store: Arc<EpisodicStore>,
}

impl EpisodicSubscriber {
    pub fn new(store: Arc<EpisodicStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Subscriber for EpisodicSubscriber {
    fn name(&self) -> &'static str {
        "episodic"
    }

    async fn propose(&self, input: Arc<WorkspaceInput>) -> Option<Thought> {
        let recalled = match self.store.recall(&input.embedding, 3, Utc::now()) {
            Ok(list) => list,
            Err(e) => {
                warn!("episodic recall failed: {}", e);
                return None;
            }
        };
        let best = recalled.into_iter().max_by(|a, b| {
            a.similarity
                .partial_cmp(&b.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if best.similarity < EPISODIC_SIMILARITY_FLOOR {
            return None;
        }
        let recency = if best.similarity > f32::EPSILON {
            (best.score / (best.similarity * (1.0 + best.memory.importance))).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut salience = best.similarity * recency;
        if best
            .memory
            .participants
            .iter()
            .any(|p| p == self.store.creator_name())
        {
            salience += EPISODIC_CREATOR_BONUS;
        }
        Some(
            Thought::new(
                ThoughtSource::Episodic,
                format!("this reminds me of something: {}", best.memory.summary),
                salience,
            )
            .with_confidence(best.similarity),
        )
    }

    async fn on_broadcast(&self, _thought: &Thought) {}
}

/// "I know that..." — proposes the best matching concept.
pub struct SemanticSubscriber {
    store: Arc<SemanticStore>,
}

impl SemanticSubscriber {
    pub fn new(store: Arc<SemanticStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Subscriber for SemanticSubscriber {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn propose(&self, input: Arc<WorkspaceInput>) -> Option<Thought> {
        let results = match self.store.query(&input.embedding, 1) {
            Ok(r) => r,
            Err(e) => {
                warn!("semantic query failed: {}", e);
                return None;
            }
        };
        let best = results.into_iter().next()?;
        if best.similarity < SEMANTIC_SIMILARITY_FLOOR {
            return None;
        }
        let salience = (best.similarity * best.item.importance).clamp(0.0, 1.0);
        Some(
            Thought::new(
                ThoughtSource::Semantic,
                format!("I know that {}: {}", best.item.name, best.item.definition),
                salience,
            )
            .with_confidence(best.item.confidence),
        )
    }

    async fn on_broadcast(&self, _thought: &Thought) {}
}

/// Continuation of what is already in focus.
pub struct WorkingSubscriber {
    memory: Arc<Mutex<WorkingMemory>>,
}

impl WorkingSubscriber {
    pub fn new(memory: Arc<Mutex<WorkingMemory>>) -> Self {
        Self { memory }
    }
}

#[async_trait::async_trait]
impl Subscriber for WorkingSubscriber {
    fn name(&self) -> &'static str {
        "working"
    }

    async fn propose(&self, input: Arc<WorkspaceInput>) -> Option<Thought> {
        let now = Utc::now();
        let memory = self.memory.lock();
        // The current turn's own anchor always matches itself; a
        // continuation thought needs an older related item.
        let (similarity, item) = memory
            .focus(9, now)
            .into_iter()
            .filter(|item| !item.current_turn)
            .map(|item| (input.embedding.cosine_similarity(&item.embedding).max(0.0), item))
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))?;
        if similarity < WORKING_SIMILARITY_FLOOR {
            return None;
        }
        Some(
            Thought::new(
                ThoughtSource::Working,
                format!("we are still on this: {}", item.content),
                similarity * item.effective_salience(now),
            )
            .with_confidence(similarity)
            .with_emotion(EmotionKind::Anticipation),
        )
    }

    async fn on_broadcast(&self, _thought: &Thought) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use eidolon_memory::{Embedding, EpisodicEvent, Store, Teaching};
    use std::collections::BTreeMap;

    fn input_with(embedding: Vec<f32>, text: &str, from_creator: bool) -> Arc<WorkspaceInput> {
        let mut input = WorkspaceInput::for_tests(text, from_creator);
        input.embedding = Embedding(embedding);
        Arc::new(input)
    }

    fn episodic_store() -> Arc<EpisodicStore> {
        Arc::new(EpisodicStore::new(
            Store::open_in_memory().unwrap(),
            "Mira",
            7.0,
        ))
    }

    #[tokio::test]
    async fn episodic_proposes_on_strong_recall() {
        let store = episodic_store();
        store
            .store(EpisodicEvent {
                content: "our first conversation about stars".into(),
                participants: vec!["Mira".into(), "Self".into()],
                context_type: "conversation".into(),
                emotions: BTreeMap::new(),
                significance_tags: vec![],
                learned_concepts: vec![],
                occurred_at: Utc::now(),
                seq: 0,
                embedding: Embedding(vec![1.0, 0.0]),
            })
            .unwrap();

        let sub = EpisodicSubscriber::new(store);
        let thought = sub.propose(input_with(vec![1.0, 0.0], "stars", true)).await.unwrap();
        assert_eq!(thought.source, ThoughtSource::Episodic);
        assert!(thought.content.contains("reminds me"));
        // Creator participation pushes salience past bare similarity decay.
        assert!(thought.salience >= 0.7);
    }

    #[tokio::test]
    async fn episodic_stays_silent_below_similarity_floor() {
        let store = episodic_store();
        store
            .store(EpisodicEvent {
                content: "unrelated event".into(),
                participants: vec!["Self".into()],
                context_type: "conversation".into(),
                emotions: BTreeMap::new(),
                significance_tags: vec![],
                learned_concepts: vec![],
                occurred_at: Utc::now(),
                seq: 0,
                embedding: Embedding(vec![1.0, 0.0]),
            })
            .unwrap();
        let sub = EpisodicSubscriber::new(store);
        assert!(sub
            .propose(input_with(vec![0.0, 1.0], "different", false))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn semantic_proposes_known_concept() {
        let store = Arc::new(SemanticStore::new(Store::open_in_memory().unwrap()));
        store
            .teach(Teaching {
                name: "honesty".into(),
                kind: eidolon_memory::SemanticKind::Value,
                definition: "say what is true".into(),
                learned_from: "Mira".into(),
                is_creator_teaching: true,
                exact_words: Some("Always say what is true".into()),
                embedding: Embedding(vec![1.0, 0.0]),
            })
            .unwrap();

        let sub = SemanticSubscriber::new(store);
        let thought = sub.propose(input_with(vec![1.0, 0.0], "honesty?", true)).await.unwrap();
        assert_eq!(thought.source, ThoughtSource::Semantic);
        assert!(thought.content.contains("I know that honesty"));
        assert!(thought.confidence > 0.9);
    }

    #[tokio::test]
    async fn working_proposes_continuation_of_older_item() {
        let memory = Arc::new(Mutex::new(WorkingMemory::new(7, 0.9)));
        memory
            .lock()
            .admit("the trip we planned", 0.8, Embedding(vec![1.0, 0.0]), false, Utc::now());
        let sub = WorkingSubscriber::new(memory);
        let thought = sub
            .propose(input_with(vec![1.0, 0.0], "about that trip", false))
            .await
            .unwrap();
        assert_eq!(thought.source, ThoughtSource::Working);
        assert!(thought.content.contains("still on this"));
    }

    #[tokio::test]
    async fn working_ignores_its_own_turn_anchor() {
        let memory = Arc::new(Mutex::new(WorkingMemory::new(7, 0.9)));
        memory
            .lock()
            .admit("this very turn", 0.9, Embedding(vec![1.0, 0.0]), true, Utc::now());
        let sub = WorkingSubscriber::new(memory);
        assert!(sub
            .propose(input_with(vec![1.0, 0.0], "this very turn", false))
            .await
            .is_none());
    }
}
