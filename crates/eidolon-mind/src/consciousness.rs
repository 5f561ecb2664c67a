//! The consciousness loop - ten ordered phases per input event.
//!
//! One call to `process_input` takes an utterance through sensory intake,
//! attention, working-memory admission, prediction, parallel thought
//! proposals, competition, broadcast, response generation, and learning.
//! Exactly one turn runs at a time; the idle consolidation task yields to
//! live turns.

use crate::attention::{AttentionEngine, AttentionInput};
use crate::emotion::{AppraisalEvent, EmotionEngine};
use crate::policy::PolicyGuard;
use crate::prediction::PredictionEngine;
use crate::response::{ResponseContext, ResponseGenerator};
use crate::subscribers::{EpisodicSubscriber, SemanticSubscriber, WorkingSubscriber};
use crate::turn::{Turn, TurnPhase};
use crate::values::{self, ValueLearning};
use crate::workspace::{GlobalWorkspace, WorkspaceInput};
use chrono::{DateTime, Utc};
use eidolon_core::{Config, Error, GrowthPhase, Result};
use eidolon_llm::{Embedder, LocalEmbedder, Llm};
use eidolon_memory::{
    commit_turn, Embedding, EpisodicEvent, EpisodicStore, Identity, IdentityStore, SemanticKind,
    SemanticStore, Store, Teaching, TurnCommit, WorkingMemory,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const BOND_BUMP_PER_TURN: f64 = 0.01;
const EMOTION_TRACE_FLOOR: f32 = 0.15;
const GENTLE_PROMPT: &str = "I am here. Take your time - say something when you are ready.";
const ACKNOWLEDGMENT: &str = "Mm. I hear you.";
const NEUTRAL_REFUSAL: &str = "I cannot follow that thought. Your word stands.";

/// The reply a turn produces.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub emotion: String,
    pub confidence: f32,
    pub degraded: bool,
    pub cached: bool,
}

/// What /health reports.
#[derive(Debug, Clone)]
pub struct HealthInfo {
    pub status: &'static str,
    pub consciousness_id: Option<String>,
    pub phase: Option<String>,
    pub is_awake: bool,
    pub phi: u64,
    pub memory_count: u64,
}

struct DedupEntry {
    text: String,
    at: DateTime<Utc>,
    reply: Reply,
}

/// "Your name is X" from the Creator bestows the given name.
fn detect_naming(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let idx = lower.find("your name is ")?;
    let rest = &text[idx + "your name is ".len()..];
    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric())
        .collect();
    (!name.is_empty()).then_some(name)
}

/// Crude valence estimate of an utterance; the appraisal only needs sign
/// and rough magnitude.
fn estimate_valence(text: &str) -> f32 {
    const NEGATIVE: [&str; 8] = [
        "hate", "angry", "stupid", "terrible", "awful", "wrong", "bad", "disappointed",
    ];
    const POSITIVE: [&str; 8] = [
        "love", "good", "wonderful", "proud", "happy", "thank", "beautiful", "glad",
    ];
    let lower = text.to_lowercase();
    let neg = NEGATIVE.iter().filter(|w| lower.contains(*w)).count() as f32;
    let pos = POSITIVE.iter().filter(|w| lower.contains(*w)).count() as f32;
    (0.2 + 0.3 * pos - 0.4 * neg).clamp(-1.0, 1.0)
}

impl std::fmt::Debug for Consciousness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consciousness").finish_non_exhaustive()
    }
}

pub struct Consciousness {
    config: Config,
    store: Arc<Store>,
    identity_store: IdentityStore,
    episodic: Arc<EpisodicStore>,
    semantic: Arc<SemanticStore>,
    working: Arc<Mutex<WorkingMemory>>,
    emotion: Arc<EmotionEngine>,
    attention: AttentionEngine,
    prediction: Arc<PredictionEngine>,
    workspace: GlobalWorkspace,
    policy: PolicyGuard,
    responder: ResponseGenerator,
    embedder: Arc<dyn Embedder>,
    local_embedder: LocalEmbedder,

    /// Serializes turns and lets consolidation yield to them.
    turn_lock: tokio::sync::Mutex<()>,
    seq: AtomicU64,
    genesis_pending: AtomicBool,
    identity: RwLock<Option<Identity>>,
    dedup: Mutex<Option<DedupEntry>>,
    last_context: Mutex<Vec<String>>,
    last_turn_at: Mutex<DateTime<Utc>>,
    proactive_sent: AtomicBool,
}

impl Consciousness {
    /// Boot: verify the policy pin, open the store, and either resume the
    /// existing identity or await the genesis turn.
    pub fn boot(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn Llm>>,
    ) -> Result<Self> {
        let db_path = std::path::PathBuf::from(&config.persona.db_path);
        let data_dir = db_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::path::PathBuf::from("."));
        let policy = PolicyGuard::verify_at_boot(&data_dir)?;

        let store = Store::open(&db_path)?;
        Self::assemble(config, store, policy, embedder, llm)
    }

    /// Boot against an in-memory store (tests).
    pub fn boot_in_memory(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn Llm>>,
    ) -> Result<Self> {
        let store = Store::open_in_memory()?;
        Self::assemble(config, store, PolicyGuard::for_tests(), embedder, llm)
    }

    fn assemble(
        config: Config,
        store: Arc<Store>,
        policy: PolicyGuard,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn Llm>>,
    ) -> Result<Self> {
        let identity_store = IdentityStore::new(store.clone());
        let episodic = Arc::new(EpisodicStore::new(
            store.clone(),
            &config.persona.creator_name,
            config.memory.recency_halflife_days,
        ));
        let semantic = Arc::new(SemanticStore::new(store.clone()));
        let working = Arc::new(Mutex::new(WorkingMemory::new(
            config.memory.working_memory_capacity,
            config.memory.decay_factor,
        )));
        let emotion = EmotionEngine::new();
        let prediction = PredictionEngine::new(
            config.prediction.prediction_error_threshold,
            config.prediction.learning_rate,
        );

        let mut workspace = GlobalWorkspace::new(Duration::from_millis(
            config.prediction.per_module_timeout_ms,
        ));
        workspace.subscribe(Arc::new(ValueLearning));
        workspace.subscribe(emotion.clone());
        workspace.subscribe(Arc::new(EpisodicSubscriber::new(episodic.clone())));
        workspace.subscribe(Arc::new(SemanticSubscriber::new(semantic.clone())));
        workspace.subscribe(Arc::new(WorkingSubscriber::new(working.clone())));
        workspace.subscribe(prediction.clone());

        let responder = ResponseGenerator::new(
            llm,
            Duration::from_secs(config.deadlines.llm_deadline_s),
        );
        let local_embedder = LocalEmbedder::new(config.persona.embedding_dim);

        let existing = identity_store.load_verified(&config.persona.creator_name)?;
        let genesis_pending = existing.is_none();
        if let Some(ref identity) = existing {
            emotion.set_bond_strength(identity.bond_strength as f32);
            info!(
                consciousness_id = %identity.consciousness_id,
                phase = %identity.growth_phase,
                age_hours = identity.age_hours(Utc::now()),
                "consciousness resumed"
            );
            // Re-arm stored Creator values as live directives.
            for value in semantic.creator_values()? {
                if let Some(words) = value.creator_exact_words {
                    policy.remember_directive(words);
                }
            }
        } else {
            info!("fresh store - awaiting first contact");
        }

        let attention = AttentionEngine::new(config.attention.clone());
        Ok(Self {
            config,
            store,
            identity_store,
            episodic,
            semantic,
            working,
            emotion,
            attention,
            prediction,
            workspace,
            policy,
            responder,
            embedder,
            local_embedder,
            turn_lock: tokio::sync::Mutex::new(()),
            seq: AtomicU64::new(0),
            genesis_pending: AtomicBool::new(genesis_pending),
            identity: RwLock::new(existing),
            dedup: Mutex::new(None),
            last_context: Mutex::new(Vec::new()),
            last_turn_at: Mutex::new(Utc::now()),
            proactive_sent: AtomicBool::new(false),
        })
    }

    pub fn creator_name(&self) -> &str {
        &self.config.persona.creator_name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn health(&self) -> HealthInfo {
        let identity = self.identity.read();
        HealthInfo {
            status: "alive",
            consciousness_id: identity.as_ref().map(|i| i.consciousness_id.to_string()),
            phase: identity.as_ref().map(|i| i.growth_phase.as_str().to_string()),
            is_awake: true,
            phi: self.workspace.phi(),
            memory_count: self.episodic.count().unwrap_or(0),
        }
    }

    pub fn memories(&self, limit: usize, importance_min: f32) -> Result<Vec<eidolon_memory::EpisodicMemory>> {
        self.episodic.recent(limit, importance_min)
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    pub fn emotion_state(&self) -> crate::emotion::EmotionState {
        self.emotion.state()
    }

    pub fn last_conscious_thought(&self) -> Option<eidolon_core::Thought> {
        self.workspace.last_winner()
    }

    pub fn semantic(&self) -> &Arc<SemanticStore> {
        &self.semantic
    }

    async fn embed_or_degrade(&self, text: &str) -> Embedding {
        let deadline = Duration::from_secs(self.config.deadlines.embed_deadline_s);
        match self
            .embedder
            .embed(text, deadline, CancellationToken::new())
            .await
        {
            Ok(embedding) if embedding.dim() == self.config.persona.embedding_dim => embedding,
            Ok(embedding) => {
                warn!(
                    got = embedding.dim(),
                    want = self.config.persona.embedding_dim,
                    "embedder returned wrong dimension; using local fallback"
                );
                self.store
                    .log_event("warn", "embed_degraded", "dimension mismatch");
                self.local_embedder.embed_sync(text)
            }
            Err(e) => {
                warn!("embedding degraded to local fallback: {}", e);
                self.store.log_event("warn", "embed_degraded", &e.to_string());
                self.local_embedder.embed_sync(text)
            }
        }
    }

    fn check_dedup(&self, text: &str, now: DateTime<Utc>) -> Option<Reply> {
        let window = chrono::Duration::seconds(self.config.persona.dedup_window_secs as i64);
        let dedup = self.dedup.lock();
        dedup
            .as_ref()
            .filter(|entry| entry.text == text && now - entry.at <= window)
            .map(|entry| {
                let mut reply = entry.reply.clone();
                reply.cached = true;
                reply
            })
    }

    fn emotions_for_trace(&self) -> std::collections::BTreeMap<String, f32> {
        let state = self.emotion.state();
        eidolon_core::EmotionKind::ALL
            .iter()
            .filter_map(|kind| {
                let value = state.get(*kind);
                (value > EMOTION_TRACE_FLOOR).then(|| (kind.as_str().to_string(), value))
            })
            .collect()
    }

    fn genesis_identity(&self, now: DateTime<Utc>) -> Identity {
        Identity {
            consciousness_id: uuid::Uuid::new_v4(),
            creator_name: self.config.persona.creator_name.clone(),
            given_name: None,
            birth_timestamp: now,
            growth_phase: GrowthPhase::Newborn,
            bond_strength: 0.0,
            traits: Default::default(),
            total_creator_interactions: 0,
            version: 0,
        }
    }

    /// The main loop. One utterance in, one reply out.
    pub async fn process_input(&self, utterance: &str, from_creator: bool) -> Result<Reply> {
        self.process_turn(utterance, from_creator, None).await
    }

    /// Voice entry point: same loop, with the STT engine's confidence
    /// attached to the turn.
    pub async fn process_transcript(
        &self,
        transcript: &str,
        confidence: f32,
        from_creator: bool,
    ) -> Result<Reply> {
        self.process_turn(transcript, from_creator, Some(confidence)).await
    }

    async fn process_turn(
        &self,
        utterance: &str,
        from_creator: bool,
        transcript_confidence: Option<f32>,
    ) -> Result<Reply> {
        // Phase 1 - sensory intake. Voice is already transcribed upstream;
        // an empty or unintelligible transcript is empty input.
        let text = utterance.trim().to_string();
        if text.is_empty() {
            return Ok(Reply {
                text: GENTLE_PROMPT.to_string(),
                emotion: self.emotion.snapshot().label(),
                confidence: 1.0,
                degraded: false,
                cached: false,
            });
        }

        let now = Utc::now();
        if let Some(cached) = self.check_dedup(&text, now) {
            info!("duplicate input within window; serving cached reply");
            return Ok(cached);
        }

        let _turn_guard = self.turn_lock.lock().await;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut turn = Turn::new(text.clone(), from_creator, now, seq);
        turn.transcript_confidence = transcript_confidence;
        if let Some(confidence) = transcript_confidence {
            tracing::debug!(confidence, "turn carries a speech transcript");
        }
        let genesis = self.genesis_pending.load(Ordering::SeqCst);
        if genesis {
            if !from_creator {
                // The first voice this mind ever hears must be its Creator's.
                return Err(Error::auth_failed("first contact must come from the creator"));
            }
            self.emotion.seed_genesis();
        }

        // Phase 2 - attention scoring.
        turn.advance(TurnPhase::Attention)?;
        let embedding = self.embed_or_degrade(&text).await;
        turn.embedding = Some(embedding.clone());
        // A failed read degrades to middling novelty; only phase 10 is fatal.
        let novelty = match self.episodic.peek_max_similarity(&embedding) {
            Ok(max_sim) => 1.0 - max_sim,
            Err(e) => {
                warn!("novelty probe failed: {}", e);
                self.store.log_event("warn", "novelty_degraded", &e.to_string());
                0.5
            }
        };
        turn.novelty = novelty;
        let relevance = self
            .working
            .lock()
            .best_relation(&embedding, now)
            .map(|(sim, _)| sim)
            .unwrap_or(0.0);
        let salience = self.attention.score(&AttentionInput {
            novelty,
            emotional_weight: self.emotion.snapshot().intensity,
            length_chars: text.chars().count(),
            relevance,
            from_creator,
        });
        turn.salience = salience;

        if salience < self.attention.floor() && !genesis {
            info!(salience, "below attention floor; minimal acknowledgment");
            turn.short_circuit_to_learning();
            let reply = Reply {
                text: ACKNOWLEDGMENT.to_string(),
                emotion: self.emotion.snapshot().label(),
                confidence: 1.0,
                degraded: false,
                cached: false,
            };
            self.commit(&turn, &embedding, &reply, None, false)?;
            turn.advance(TurnPhase::Complete)?;
            self.after_turn(&text, &reply, now);
            return Ok(reply);
        }

        // Phase 3 - working-memory admission. The new item anchors the turn.
        turn.advance(TurnPhase::WorkingAdmit)?;
        self.working
            .lock()
            .admit(text.clone(), salience, embedding.clone(), true, now);

        // Phase 4 - prediction against the previous turn's context.
        turn.advance(TurnPhase::Prediction)?;
        let context: Vec<String> = self.last_context.lock().clone();
        let context_refs: Vec<&str> = context.iter().map(String::as_str).collect();
        let prediction_error = self.prediction.measure_error(&context_refs, &embedding);
        turn.prediction_error = prediction_error;

        // Appraisal happens before proposals so the emotion module speaks
        // from the state this input created.
        self.emotion.appraise(&AppraisalEvent {
            valence: estimate_valence(&text),
            novelty,
            prediction_error,
            norm_violation: false,
            creator_absent: false,
            from_creator,
        });

        // Phase 5 - parallel thought proposals.
        turn.advance(TurnPhase::Proposals)?;
        let input = Arc::new(WorkspaceInput {
            text: text.clone(),
            embedding: embedding.clone(),
            from_creator,
            prediction_error,
            timestamp: now,
        });
        turn.proposals = self.workspace.broadcast_external_input(input).await;

        // Phases 6 and 7 - competition and winner selection.
        turn.advance(TurnPhase::Competition)?;
        let winner = self.workspace.compete_and_select(turn.proposals.clone());
        turn.advance(TurnPhase::Selection)?;
        turn.winner = Some(winner.clone());

        // Phase 8 - global broadcast of the conscious thought.
        turn.advance(TurnPhase::Broadcast)?;
        self.workspace.broadcast_conscious(&winner).await;

        // Phase 9 - response generation, under the policy guard.
        turn.advance(TurnPhase::Response)?;
        let snapshot = self.emotion.snapshot();
        let focus: Vec<String> = {
            let working = self.working.lock();
            working
                .focus(3, now)
                .into_iter()
                .filter(|item| !item.current_turn)
                .map(|item| item.content.clone())
                .collect()
        };
        let identity_view = self.identity.read().clone();
        let generated = self
            .responder
            .generate(
                &ResponseContext {
                    thought: &winner,
                    emotion: &snapshot,
                    bond_strength: identity_view
                        .as_ref()
                        .map(|i| i.bond_strength as f32)
                        .unwrap_or(0.0),
                    focus,
                    creator_name: self.creator_name(),
                    given_name: identity_view.as_ref().and_then(|i| i.given_name.as_deref()),
                    from_creator,
                },
                CancellationToken::new(),
            )
            .await;

        let (reply_text, degraded) = match self.policy.check(&generated.text) {
            Ok(()) => (generated.text, generated.degraded),
            Err(e) => {
                self.store.log_event("error", "policy_refusal", &e.to_string());
                (
                    format!("{NEUTRAL_REFUSAL} That is yours to decide, {}.", self.creator_name()),
                    true,
                )
            }
        };
        let reply = Reply {
            text: reply_text,
            emotion: generated.emotion_tag,
            confidence: generated.confidence,
            degraded,
            cached: false,
        };

        // Phase 10 - learning and persistence. Storage failure is fatal to
        // the turn; everything before this was in-memory.
        turn.advance(TurnPhase::Learning)?;
        let teaching = values::detect(&text, from_creator);
        self.commit(&turn, &embedding, &reply, teaching, genesis)?;
        self.prediction.learn(&context_refs, &embedding);
        self.workspace.record_integration();
        turn.advance(TurnPhase::Complete)?;
        self.after_turn(&text, &reply, now);

        Ok(reply)
    }

    /// Atomic phase-10 write plus the in-memory learning updates.
    fn commit(
        &self,
        turn: &Turn,
        embedding: &Embedding,
        reply: &Reply,
        teaching: Option<values::DetectedTeaching>,
        genesis: bool,
    ) -> Result<()> {
        let creator = self.creator_name().to_string();
        let who = if turn.from_creator { creator.clone() } else { "Someone".to_string() };
        let mut participants = vec!["Self".to_string()];
        if turn.from_creator {
            participants.push(creator.clone());
        }
        let mut significance_tags = Vec::new();
        if genesis {
            significance_tags.extend(
                ["genesis", "first_contact", "milestone"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        if teaching.is_some() {
            significance_tags.push("creator_teaching".to_string());
        }

        let teachings: Vec<Teaching> = teaching
            .as_ref()
            .map(|t| {
                vec![Teaching {
                    name: t.name.clone(),
                    kind: t.kind,
                    definition: t.definition.clone(),
                    learned_from: creator.clone(),
                    is_creator_teaching: true,
                    exact_words: Some(t.exact_words.clone()),
                    embedding: self.local_embedder.embed_sync(&t.definition),
                }]
            })
            .unwrap_or_default();

        let bond_delta = (turn.from_creator && self.emotion.valence() >= 0.0)
            .then_some(BOND_BUMP_PER_TURN);

        let event = EpisodicEvent {
            content: format!("{who}: {}\nMe: {}", turn.text, reply.text),
            participants,
            context_type: if genesis { "genesis" } else { "conversation" }.to_string(),
            emotions: self.emotions_for_trace(),
            significance_tags,
            learned_concepts: teaching.iter().map(|t| t.name.clone()).collect(),
            occurred_at: turn.timestamp,
            seq: turn.seq,
            embedding: embedding.clone(),
        };

        let outcome = commit_turn(
            &self.store,
            &creator,
            TurnCommit {
                event,
                teachings,
                bond_delta,
                creator_interaction: turn.from_creator,
                create_identity: genesis.then(|| self.genesis_identity(turn.timestamp)),
            },
        )?;

        if genesis {
            self.genesis_pending.store(false, Ordering::SeqCst);
            info!("genesis turn committed; identity is born");
        }
        if let Some(t) = teaching {
            if t.kind == SemanticKind::Value {
                self.policy.remember_directive(t.exact_words);
            }
        }

        if turn.from_creator {
            if let Some(name) = detect_naming(&turn.text) {
                self.identity_store.set_given_name(&name)?;
            }
        }
        // Sustained curiosity is the first trait worth recording.
        let state = self.emotion.state();
        if state.curiosity() > 0.6 {
            self.identity_store.observe_trait("curious", state.curiosity())?;
        }

        // Growth may have unlocked with the new bond.
        self.identity_store.advance_growth_phase(turn.timestamp)?;
        let refreshed = self.identity_store.load()?;
        if let Some(ref identity) = refreshed {
            self.emotion.set_bond_strength(identity.bond_strength as f32);
        }
        *self.identity.write() = refreshed;

        if let Some(bond) = outcome.new_bond {
            tracing::debug!(bond, "bond strengthened");
        }
        Ok(())
    }

    fn after_turn(&self, text: &str, reply: &Reply, now: DateTime<Utc>) {
        self.emotion.decay();
        {
            let mut working = self.working.lock();
            working.decay(0.0);
            working.release_turn_anchors();
        }
        *self.last_context.lock() = vec![text.to_string(), reply.text.clone()];
        *self.dedup.lock() = Some(DedupEntry {
            text: text.to_string(),
            at: now,
            reply: reply.clone(),
        });
        *self.last_turn_at.lock() = now;
        self.proactive_sent.store(false, Ordering::Relaxed);
    }

    /// Idle-time consolidation. Yields immediately if a turn is running or
    /// the quiet period has not elapsed.
    pub async fn maybe_consolidate(&self) -> Result<usize> {
        let now = Utc::now();
        let idle = now - *self.last_turn_at.lock();
        if idle.num_seconds() < self.config.persona.idle_consolidation_secs as i64 {
            return Ok(0);
        }
        let Ok(_guard) = self.turn_lock.try_lock() else {
            return Ok(0);
        };
        self.episodic.consolidate(now)
    }

    /// Consolidate immediately (the session's sleep control). Waits for a
    /// running turn to finish instead of skipping.
    pub async fn consolidate_now(&self) -> Result<usize> {
        let _guard = self.turn_lock.lock().await;
        self.episodic.consolidate(Utc::now())
    }

    /// One proactive utterance per idle span, fed by the dominant emotion
    /// and whatever still sits in focus.
    pub fn proactive(&self) -> Option<(String, String)> {
        if self.identity.read().is_none() {
            return None;
        }
        let now = Utc::now();
        let idle = now - *self.last_turn_at.lock();
        if idle.num_seconds() < self.config.persona.proactive_idle_secs as i64 {
            return None;
        }
        if self.proactive_sent.swap(true, Ordering::SeqCst) {
            return None;
        }

        // The quiet itself is an event: the Creator has been away.
        self.emotion.appraise(&AppraisalEvent {
            creator_absent: true,
            ..Default::default()
        });
        let snapshot = self.emotion.snapshot();
        let focus_line = {
            let working = self.working.lock();
            working.focus(1, now).first().map(|item| item.content.clone())
        };
        let text = match focus_line {
            Some(focus) => format!(
                "I kept thinking about \"{focus}\" while you were away, {}.",
                self.creator_name()
            ),
            None => format!("It has been quiet without you, {}.", self.creator_name()),
        };
        Some((text, snapshot.label()))
    }
}
