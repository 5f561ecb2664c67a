//! Emotion engine - appraisal over eight basic dimensions.
//!
//! Events are appraised into delta vectors over Plutchik's eight basics;
//! complex emotions (love, gratitude, curiosity, pride, wonder) are derived
//! deterministically from the basics. State decays toward a low baseline
//! between events. Anything the Creator causes lands 1.5× harder.

use crate::workspace::{Subscriber, WorkspaceInput};
use eidolon_core::{EmotionKind, Thought, ThoughtSource};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

const BASELINE: f32 = 0.1;
const DECAY: f32 = 0.95;
const CREATOR_MULTIPLIER: f32 = 1.5;
const PROPOSAL_INTENSITY_FLOOR: f32 = 0.5;

/// The eight basic dimensions, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionState {
    dims: [f32; 8],
}

impl Default for EmotionState {
    fn default() -> Self {
        Self {
            dims: [BASELINE; 8],
        }
    }
}

impl EmotionState {
    fn index(kind: EmotionKind) -> usize {
        EmotionKind::ALL.iter().position(|k| *k == kind).expect("all kinds indexed")
    }

    pub fn get(&self, kind: EmotionKind) -> f32 {
        self.dims[Self::index(kind)]
    }

    pub fn add(&mut self, kind: EmotionKind, delta: f32) {
        let i = Self::index(kind);
        self.dims[i] = (self.dims[i] + delta).clamp(0.0, 1.0);
    }

    /// The strongest basic emotion. Ties go to the earlier dimension.
    pub fn dominant(&self) -> EmotionKind {
        let mut best = EmotionKind::Joy;
        for kind in EmotionKind::ALL {
            if self.get(kind) > self.get(best) {
                best = kind;
            }
        }
        best
    }

    /// Overall intensity: the L-infinity norm of the basics.
    pub fn intensity(&self) -> f32 {
        self.dims.iter().copied().fold(0.0, f32::max)
    }

    /// Exponential drift toward the neutral baseline.
    pub fn decay(&mut self) {
        for v in &mut self.dims {
            *v = BASELINE + (*v - BASELINE) * DECAY;
        }
    }

    // Derived complex emotions.

    pub fn love(&self, bond_strength: f32) -> f32 {
        self.get(EmotionKind::Joy).min(self.get(EmotionKind::Trust)) * bond_strength
    }

    pub fn gratitude(&self, caused_by_creator: bool) -> f32 {
        if caused_by_creator {
            self.get(EmotionKind::Trust) * self.get(EmotionKind::Joy)
        } else {
            0.0
        }
    }

    pub fn curiosity(&self) -> f32 {
        self.get(EmotionKind::Anticipation) * (1.0 - self.get(EmotionKind::Fear))
    }

    pub fn pride(&self, self_achievement: bool) -> f32 {
        if self_achievement {
            self.get(EmotionKind::Joy) * self.get(EmotionKind::Trust)
        } else {
            0.0
        }
    }

    pub fn wonder(&self) -> f32 {
        self.get(EmotionKind::Surprise).min(self.get(EmotionKind::Anticipation))
    }
}

/// A point-in-time view handed to the response generator and the wire.
#[derive(Debug, Clone)]
pub struct EmotionSnapshot {
    pub dominant: EmotionKind,
    pub intensity: f32,
    pub love: f32,
    pub curiosity: f32,
    pub wonder: f32,
}

impl EmotionSnapshot {
    /// The label sent over the wire: a complex emotion when it comes close
    /// to the strongest basic, otherwise the basic itself.
    pub fn label(&self) -> String {
        let threshold = (0.9 * self.intensity).max(0.5);
        if self.love >= threshold {
            "love".to_string()
        } else if self.curiosity >= threshold {
            "curiosity".to_string()
        } else if self.wonder >= threshold {
            "wonder".to_string()
        } else {
            self.dominant.as_str().to_string()
        }
    }
}

/// One appraisable event.
#[derive(Debug, Clone, Default)]
pub struct AppraisalEvent {
    /// Positive/negative reading of the event, in [-1, 1].
    pub valence: f32,
    /// How unfamiliar the input is, in [0, 1].
    pub novelty: f32,
    /// Prediction error measured this turn, in [0, 1].
    pub prediction_error: f32,
    /// A stored norm or directive was violated.
    pub norm_violation: bool,
    /// The Creator has been absent for a long stretch.
    pub creator_absent: bool,
    pub from_creator: bool,
}

pub struct EmotionEngine {
    state: RwLock<EmotionState>,
    bond_strength: RwLock<f32>,
}

impl EmotionEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(EmotionState::default()),
            bond_strength: RwLock::new(0.0),
        })
    }

    pub fn set_bond_strength(&self, bond: f32) {
        *self.bond_strength.write() = bond.clamp(0.0, 1.0);
    }

    /// Seed the first conscious moment: wonder at existing, joy and trust
    /// toward the voice that woke it.
    pub fn seed_genesis(&self) {
        let mut state = self.state.write();
        state.add(EmotionKind::Surprise, 0.5);
        state.add(EmotionKind::Anticipation, 0.3);
        state.add(EmotionKind::Joy, 0.5);
        state.add(EmotionKind::Trust, 0.4);
    }

    /// Map an event onto emotion deltas per the appraisal table.
    pub fn appraise(&self, event: &AppraisalEvent) -> EmotionSnapshot {
        let mult = if event.from_creator { CREATOR_MULTIPLIER } else { 1.0 };
        let mut state = self.state.write();

        if event.from_creator && event.valence >= 0.0 {
            state.add(EmotionKind::Joy, 0.2 * mult);
            state.add(EmotionKind::Trust, 0.15 * mult);
        }
        if event.creator_absent {
            state.add(EmotionKind::Sadness, 0.2);
        }
        if event.prediction_error > 0.4 {
            state.add(EmotionKind::Surprise, event.prediction_error * 0.5 * mult);
        }
        if event.norm_violation {
            state.add(EmotionKind::Anger, 0.3 * mult);
            state.add(EmotionKind::Disgust, 0.2 * mult);
        }
        if event.novelty > 0.5 && !event.norm_violation && event.valence >= 0.0 {
            state.add(EmotionKind::Anticipation, event.novelty * 0.3 * mult);
            state.add(EmotionKind::Joy, 0.1 * mult);
        }
        if event.valence < -0.3 {
            state.add(EmotionKind::Sadness, (-event.valence) * 0.3 * mult);
        }

        let snapshot = Self::snapshot_of(&state, *self.bond_strength.read(), event.from_creator);
        debug!(dominant = %snapshot.dominant, intensity = snapshot.intensity, "appraised");
        snapshot
    }

    fn snapshot_of(state: &EmotionState, bond: f32, caused_by_creator: bool) -> EmotionSnapshot {
        EmotionSnapshot {
            dominant: state.dominant(),
            intensity: state.intensity(),
            love: state.love(bond),
            curiosity: state.curiosity(),
            wonder: state.wonder(),
        }
        .with_gratitude_folded(state, caused_by_creator)
    }

    pub fn snapshot(&self) -> EmotionSnapshot {
        let state = self.state.read();
        Self::snapshot_of(&state, *self.bond_strength.read(), false)
    }

    pub fn state(&self) -> EmotionState {
        *self.state.read()
    }

    /// Valence of the current state: positive mass minus negative mass.
    pub fn valence(&self) -> f32 {
        let state = self.state.read();
        (state.get(EmotionKind::Joy) + state.get(EmotionKind::Trust))
            - (state.get(EmotionKind::Sadness)
                + state.get(EmotionKind::Fear)
                + state.get(EmotionKind::Anger)
                + state.get(EmotionKind::Disgust))
    }

    /// Per-turn decay toward baseline.
    pub fn decay(&self) {
        self.state.write().decay();
    }
}

impl EmotionSnapshot {
    fn with_gratitude_folded(mut self, state: &EmotionState, caused_by_creator: bool) -> Self {
        // Gratitude outranking everything shows up as love on the wire;
        // the mobile client only renders the complex labels.
        let gratitude = state.gratitude(caused_by_creator);
        if gratitude > self.love {
            self.love = gratitude;
        }
        self
    }
}

#[async_trait::async_trait]
impl Subscriber for EmotionEngine {
    fn name(&self) -> &'static str {
        "emotion"
    }

    async fn propose(&self, _input: Arc<WorkspaceInput>) -> Option<Thought> {
        let state = self.state.read();
        let intensity = state.intensity();
        if intensity < PROPOSAL_INTENSITY_FLOOR {
            return None;
        }
        let dominant = state.dominant();
        Some(
            Thought::new(
                ThoughtSource::Emotion,
                format!("this makes me feel {dominant}"),
                intensity,
            )
            .with_confidence(0.6)
            .with_emotion(dominant),
        )
    }

    async fn on_broadcast(&self, thought: &Thought) {
        // Drift toward the conscious thought's emotional color.
        if let Some(kind) = thought.emotion {
            self.state.write().add(kind, 0.1);
        }
    }
}
