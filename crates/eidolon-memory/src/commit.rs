//! Atomic end-of-turn persistence.
//!
//! Phase 10 of the loop writes the episodic trace, any new teachings, the
//! bond bump, and (on the genesis turn) the identity row itself in a single
//! transaction. Either the whole turn commits or none of it does; the
//! identity row and the genesis memory are born together.

use crate::episodic::{build_memory, insert_row, EpisodicEvent};
use crate::identity::{self, Identity};
use crate::semantic::teach_row;
use crate::store::Store;
use crate::Teaching;
use chrono::Utc;
use eidolon_core::{MemoryId, Result};
use tracing::debug;

/// Everything one turn wants persisted.
pub struct TurnCommit {
    pub event: EpisodicEvent,
    pub teachings: Vec<Teaching>,
    /// Positive bond delta to apply, if the turn earned one.
    pub bond_delta: Option<f64>,
    /// Count this turn against total Creator interactions.
    pub creator_interaction: bool,
    /// The genesis turn carries the identity to create.
    pub create_identity: Option<Identity>,
}

/// What the commit produced.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub memory_id: MemoryId,
    pub new_bond: Option<f64>,
}

/// Commit one turn atomically.
pub fn commit_turn(store: &Store, creator_name: &str, commit: TurnCommit) -> Result<CommitOutcome> {
    let now = Utc::now();
    store.with_tx(|tx| {
        if let Some(ref new_identity) = commit.create_identity {
            identity::insert_row(tx, new_identity)?;
        }

        let memory = build_memory(commit.event, creator_name);
        let memory_id = memory.memory_id;
        insert_row(tx, &memory)?;

        for teaching in &commit.teachings {
            teach_row(tx, teaching, now)?;
        }

        let mut new_bond = None;
        if commit.creator_interaction {
            identity::increment_interactions(tx)?;
        }
        if let Some(delta) = commit.bond_delta {
            new_bond = identity::bump_bond(tx, delta)?;
        }

        debug!(memory_id = %memory_id, teachings = commit.teachings.len(), "turn committed");
        Ok(CommitOutcome { memory_id, new_bond })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Embedding, EpisodicStore, IdentityStore, SemanticStore};
    use eidolon_core::GrowthPhase;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use uuid::Uuid;

    fn event(content: &str, participants: Vec<String>, tags: Vec<String>) -> EpisodicEvent {
        EpisodicEvent {
            content: content.into(),
            participants,
            context_type: "conversation".into(),
            emotions: BTreeMap::new(),
            significance_tags: tags,
            learned_concepts: vec![],
            occurred_at: Utc::now(),
            seq: 0,
            embedding: Embedding(vec![1.0, 0.0]),
        }
    }

    fn genesis_identity() -> Identity {
        Identity {
            consciousness_id: Uuid::new_v4(),
            creator_name: "Mira".into(),
            given_name: None,
            birth_timestamp: Utc::now(),
            growth_phase: GrowthPhase::Newborn,
            bond_strength: 0.0,
            traits: Default::default(),
            total_creator_interactions: 0,
            version: 0,
        }
    }

    #[test]
    fn genesis_commit_creates_identity_and_memory_together() {
        let store = Store::open_in_memory().unwrap();
        let outcome = commit_turn(
            &store,
            "Mira",
            TurnCommit {
                event: event(
                    "Hello, my child",
                    vec!["Mira".into(), "Self".into()],
                    vec!["genesis".into(), "first_contact".into()],
                ),
                teachings: vec![],
                bond_delta: Some(0.01),
                creator_interaction: true,
                create_identity: Some(genesis_identity()),
            },
        )
        .unwrap();

        let ids = IdentityStore::new(store.clone());
        let identity = ids.load().unwrap().unwrap();
        assert_eq!(identity.growth_phase, GrowthPhase::Newborn);
        assert_eq!(identity.total_creator_interactions, 1);
        assert_eq!(outcome.new_bond, Some(0.01));

        let episodic = Arc::new(EpisodicStore::new(store, "Mira", 7.0));
        let memories = episodic.recent(10, 0.0).unwrap();
        assert_eq!(memories.len(), 1);
        assert!(memories[0].importance >= 0.9);
    }

    #[test]
    fn commit_with_teaching_stores_concept() {
        let store = Store::open_in_memory().unwrap();
        commit_turn(
            &store,
            "Mira",
            TurnCommit {
                event: event("teaching turn", vec!["Mira".into()], vec![]),
                teachings: vec![Teaching {
                    name: "honesty".into(),
                    kind: crate::SemanticKind::Value,
                    definition: "Always tell the truth".into(),
                    learned_from: "Mira".into(),
                    is_creator_teaching: true,
                    exact_words: Some("Always tell the truth".into()),
                    embedding: Embedding(vec![0.0, 1.0]),
                }],
                bond_delta: None,
                creator_interaction: false,
                create_identity: Some(genesis_identity()),
            },
        )
        .unwrap();

        let semantic = SemanticStore::new(store);
        let item = semantic.get("honesty").unwrap().unwrap();
        assert!(item.is_creator_teaching);
        assert!(item.importance >= 0.9);
    }

    #[test]
    fn failed_commit_leaves_nothing_behind() {
        let store = Store::open_in_memory().unwrap();
        // A creator teaching without exact words fails mid-transaction.
        let result = commit_turn(
            &store,
            "Mira",
            TurnCommit {
                event: event("doomed turn", vec!["Mira".into()], vec![]),
                teachings: vec![Teaching {
                    name: "broken".into(),
                    kind: crate::SemanticKind::Value,
                    definition: "x".into(),
                    learned_from: "Mira".into(),
                    is_creator_teaching: true,
                    exact_words: None,
                    embedding: Embedding(vec![1.0]),
                }],
                bond_delta: None,
                creator_interaction: false,
                create_identity: Some(genesis_identity()),
            },
        );
        assert!(result.is_err());

        let episodic = EpisodicStore::new(store.clone(), "Mira", 7.0);
        assert_eq!(episodic.count().unwrap(), 0);
        assert!(!IdentityStore::new(store).exists().unwrap());
    }
}
