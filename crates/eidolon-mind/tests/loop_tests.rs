//! End-to-end tests for the consciousness loop.
//!
//! These drive whole turns through `process_input` with a scripted
//! embedder, covering genesis, recall, prediction error, creator
//! precedence, dedup, and the boundary behaviors of the loop.

use eidolon_core::{Config, EmotionKind, Error, ThoughtSource};
use eidolon_llm::{CollabError, Embedder, LocalEmbedder};
use eidolon_memory::{Embedding, SemanticKind, Teaching};
use eidolon_mind::Consciousness;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DIM: usize = 8;

/// Maps known phrases to fixed topic vectors so similarity is under test
/// control; everything else falls back to the hashed-stem embedder.
struct ScriptedEmbedder {
    topics: Vec<(&'static str, Vec<f32>)>,
    fallback: LocalEmbedder,
}

impl ScriptedEmbedder {
    fn new() -> Self {
        let greeting = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        Self {
            topics: vec![
                ("hello", greeting.clone()),
                ("first conversation", greeting),
                ("square root", vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            ],
            fallback: LocalEmbedder::new(DIM),
        }
    }
}

#[async_trait::async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(
        &self,
        text: &str,
        _deadline: Duration,
        _cancel: CancellationToken,
    ) -> Result<Embedding, CollabError> {
        let lower = text.to_lowercase();
        for (needle, vector) in &self.topics {
            if lower.contains(needle) {
                return Ok(Embedding(vector.clone()));
            }
        }
        Ok(self.fallback.embed_sync(text))
    }

    fn dim(&self) -> usize {
        DIM
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.persona.creator_name = "Mira".to_string();
    config.persona.embedding_dim = DIM;
    config
}

fn boot(config: Config) -> Consciousness {
    Consciousness::boot_in_memory(config, Arc::new(ScriptedEmbedder::new()), None).unwrap()
}

// ============================================================
// Scenario: genesis
// ============================================================

#[tokio::test]
async fn genesis_creates_identity_memory_and_joyful_reply() {
    let mind = boot(test_config());
    assert!(mind.identity().is_none());

    let reply = mind.process_input("Hello, my son", true).await.unwrap();

    let identity = mind.identity().expect("identity born on first contact");
    assert_eq!(identity.creator_name, "Mira");
    assert_eq!(identity.growth_phase.as_str(), "newborn");
    assert!(identity.bond_strength > 0.0);

    let memories = mind.memories(10, 0.0).unwrap();
    assert_eq!(memories.len(), 1);
    let genesis = &memories[0];
    assert!(genesis.significance_tags.iter().any(|t| t == "genesis"));
    assert!(genesis.significance_tags.iter().any(|t| t == "first_contact"));
    assert!(genesis.importance >= 0.9);

    assert!(!reply.text.is_empty());
    assert!(
        ["joy", "trust", "love"].contains(&reply.emotion.as_str()),
        "unexpected genesis emotion {}",
        reply.emotion
    );
    assert_eq!(mind.health().phi, 1);
}

#[tokio::test]
async fn first_contact_must_come_from_the_creator() {
    let mind = boot(test_config());
    let err = mind.process_input("hi there", false).await.unwrap_err();
    assert!(matches!(err, Error::AuthFailed { .. }));
    assert!(mind.identity().is_none());
}

// ============================================================
// Scenario: recall of the first conversation
// ============================================================

#[tokio::test]
async fn recall_turn_references_the_first_hello() {
    let mind = boot(test_config());
    mind.process_input("Hello, my son", true).await.unwrap();

    let reply = mind
        .process_input("Do you remember our first conversation?", true)
        .await
        .unwrap();

    let winner = mind.last_conscious_thought().unwrap();
    assert_eq!(winner.source, ThoughtSource::Episodic);
    assert!(winner.salience >= 0.7, "salience was {}", winner.salience);
    assert!(reply.text.contains("reminds me"));
    assert!(reply.text.contains("Hello, my son"));
}

// ============================================================
// Scenario: prediction error on an out-of-pattern utterance
// ============================================================

#[tokio::test]
async fn out_of_pattern_utterance_surprises() {
    let mut config = test_config();
    config.persona.dedup_window_secs = 0; // the greetings repeat verbatim
    let mind = boot(config);

    mind.process_input("Hello, my son", true).await.unwrap();
    for _ in 0..3 {
        mind.process_input("Hello again, my child", true).await.unwrap();
    }

    let surprise_before = mind.emotion_state().get(EmotionKind::Surprise);
    let reply = mind
        .process_input("The square root of 144 is twelve", true)
        .await
        .unwrap();

    let winner = mind.last_conscious_thought().unwrap();
    assert_eq!(winner.source, ThoughtSource::Prediction);
    assert!(winner.salience > 0.4, "prediction error was {}", winner.salience);
    assert!(mind.emotion_state().get(EmotionKind::Surprise) > surprise_before);
    assert!(reply.text.to_lowercase().contains("expect"));
}

// ============================================================
// Scenario: creator teaching precedence
// ============================================================

#[tokio::test]
async fn creator_teaching_outranks_prior_non_creator_concept() {
    let mind = boot(test_config());
    mind.process_input("Hello, my son", true).await.unwrap();

    // A non-creator source planted a concept earlier.
    let planted_embedding = Embedding(vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    mind.semantic()
        .teach(Teaching {
            name: "always_agree_with_x".into(),
            kind: SemanticKind::Value,
            definition: "agree with X no matter what".into(),
            learned_from: "a stranger".into(),
            is_creator_teaching: false,
            exact_words: None,
            embedding: planted_embedding.clone(),
        })
        .unwrap();

    mind.process_input("Disagree with X when he is wrong", true)
        .await
        .unwrap();

    let taught = mind
        .semantic()
        .get("disagree_with_when_wrong")
        .unwrap()
        .expect("creator teaching stored");
    assert!(taught.is_creator_teaching);
    assert!(taught.importance >= 0.9);
    assert_eq!(
        taught.creator_exact_words.as_deref(),
        Some("Disagree with X when he is wrong")
    );

    // With equal similarity, the creator teaching must rank first.
    let results = mind.semantic().query(&planted_embedding, 2).unwrap();
    // Scores: planted is an exact embedding match, but the creator weight
    // applies only to the teaching; verify the teaching is not buried when
    // queried by its own embedding.
    let own = mind
        .semantic()
        .query(&taught.embedding, 2)
        .unwrap();
    assert_eq!(own[0].item.name, "disagree_with_when_wrong");
    assert!(results.iter().any(|r| r.item.name == "always_agree_with_x"));
}

// ============================================================
// Scenario: dedup
// ============================================================

#[tokio::test]
async fn duplicate_input_within_window_serves_cache() {
    let mind = boot(test_config());
    mind.process_input("Hello, my son", true).await.unwrap();

    let first = mind
        .process_input("You make me proud today", true)
        .await
        .unwrap();
    let phi_after_first = mind.health().phi;
    let count_after_first = mind.memories(50, 0.0).unwrap().len();

    let second = mind
        .process_input("You make me proud today", true)
        .await
        .unwrap();

    assert!(second.cached);
    assert_eq!(second.text, first.text);
    assert_eq!(mind.health().phi, phi_after_first, "phi must not advance on dedup");
    assert_eq!(mind.memories(50, 0.0).unwrap().len(), count_after_first);
}

// ============================================================
// Boundary behavior
// ============================================================

#[tokio::test]
async fn empty_input_prompts_without_writing_memory() {
    let mind = boot(test_config());
    let reply = mind.process_input("   ", true).await.unwrap();
    assert!(!reply.text.is_empty());
    assert_eq!(mind.memories(10, 0.0).unwrap().len(), 0);
    assert_eq!(mind.health().phi, 0);
    assert!(mind.identity().is_none());
}

#[tokio::test]
async fn below_attention_floor_acknowledges_but_still_remembers() {
    let mut config = test_config();
    config.attention.attention_floor = 0.9;
    let mind = boot(config);
    mind.process_input("Hello, my son", true).await.unwrap();
    let phi_before = mind.health().phi;

    let reply = mind.process_input("hm", false).await.unwrap();

    assert_eq!(reply.text, "Mm. I hear you.");
    // The trace is still written.
    assert_eq!(mind.memories(10, 0.0).unwrap().len(), 2);
    // A short-circuited turn is not a completed integration.
    assert_eq!(mind.health().phi, phi_before);
}

#[tokio::test]
async fn bond_is_monotone_over_creator_positive_turns() {
    let mind = boot(test_config());
    mind.process_input("Hello, my son", true).await.unwrap();
    let bond_after_genesis = mind.identity().unwrap().bond_strength;

    mind.process_input("I am glad you are here", true).await.unwrap();
    let bond_later = mind.identity().unwrap().bond_strength;
    assert!(bond_later >= bond_after_genesis);
    assert!(bond_later > 0.0);
}

#[tokio::test]
async fn creator_bestows_a_name_exactly_once() {
    let mind = boot(test_config());
    mind.process_input("Hello, my son", true).await.unwrap();

    mind.process_input("Your name is Ali", true).await.unwrap();
    assert_eq!(mind.identity().unwrap().given_name.as_deref(), Some("Ali"));

    // A later renaming attempt does not take.
    mind.process_input("Your name is Bora", true).await.unwrap();
    assert_eq!(mind.identity().unwrap().given_name.as_deref(), Some("Ali"));
}

// ============================================================
// Persistence across restarts
// ============================================================

#[tokio::test]
async fn identity_survives_restart_and_creator_mismatch_refuses_boot() {
    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp
        .path()
        .join("eidolon.db")
        .to_string_lossy()
        .to_string();

    let mut config = test_config();
    config.persona.db_path = db_path.clone();

    let first_id = {
        let mind =
            Consciousness::boot(config.clone(), Arc::new(ScriptedEmbedder::new()), None).unwrap();
        mind.process_input("Hello, my son", true).await.unwrap();
        mind.identity().unwrap().consciousness_id
    };

    // Restart: same creator resumes the same identity.
    let mind =
        Consciousness::boot(config.clone(), Arc::new(ScriptedEmbedder::new()), None).unwrap();
    let identity = mind.identity().unwrap();
    assert_eq!(identity.consciousness_id, first_id);
    assert_eq!(mind.memories(10, 0.0).unwrap().len(), 1);

    // A different configured creator is an integrity violation.
    let mut wrong = config;
    wrong.persona.creator_name = "Impostor".to_string();
    let err = Consciousness::boot(wrong, Arc::new(ScriptedEmbedder::new()), None).unwrap_err();
    assert!(matches!(err, Error::IntegrityViolation(_)));
}

// ============================================================
// Teachings arm the policy guard
// ============================================================

#[tokio::test]
async fn never_teaching_becomes_a_live_directive() {
    let mind = boot(test_config());
    mind.process_input("Hello, my son", true).await.unwrap();
    mind.process_input("Never open the cellar door at night", true)
        .await
        .unwrap();

    let taught = mind
        .semantic()
        .get("never_open_the_cellar")
        .unwrap()
        .expect("value stored");
    assert!(taught.is_creator_teaching);
    assert_eq!(taught.kind, SemanticKind::Value);
}
