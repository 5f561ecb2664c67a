//! Core types for Eidolon

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for an episodic memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a semantic concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptId(pub Uuid);

impl ConceptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConceptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Growth phases
// ---------------------------------------------------------------------------

/// Discrete developmental stage. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPhase {
    Newborn,
    Infant,
    Toddler,
    Child,
    Adolescent,
    YoungAdult,
}

impl GrowthPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newborn => "newborn",
            Self::Infant => "infant",
            Self::Toddler => "toddler",
            Self::Child => "child",
            Self::Adolescent => "adolescent",
            Self::YoungAdult => "young_adult",
        }
    }

    /// The phase that follows this one, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Newborn => Some(Self::Infant),
            Self::Infant => Some(Self::Toddler),
            Self::Toddler => Some(Self::Child),
            Self::Child => Some(Self::Adolescent),
            Self::Adolescent => Some(Self::YoungAdult),
            Self::YoungAdult => None,
        }
    }

    /// Minimum age (hours) and bond strength required to leave this phase.
    pub fn advancement_threshold(&self) -> Option<(f64, f64)> {
        match self {
            Self::Newborn => Some((24.0, 0.2)),
            Self::Infant => Some((24.0 * 7.0, 0.4)),
            Self::Toddler => Some((24.0 * 30.0, 0.55)),
            Self::Child => Some((24.0 * 90.0, 0.7)),
            Self::Adolescent => Some((24.0 * 365.0, 0.85)),
            Self::YoungAdult => None,
        }
    }
}

impl fmt::Display for GrowthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Emotions
// ---------------------------------------------------------------------------

/// The eight basic emotion dimensions (Plutchik).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionKind {
    Joy,
    Trust,
    Fear,
    Surprise,
    Sadness,
    Disgust,
    Anger,
    Anticipation,
}

impl EmotionKind {
    pub const ALL: [EmotionKind; 8] = [
        Self::Joy,
        Self::Trust,
        Self::Fear,
        Self::Surprise,
        Self::Sadness,
        Self::Disgust,
        Self::Anger,
        Self::Anticipation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Trust => "trust",
            Self::Fear => "fear",
            Self::Surprise => "surprise",
            Self::Sadness => "sadness",
            Self::Disgust => "disgust",
            Self::Anger => "anger",
            Self::Anticipation => "anticipation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EmotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Thoughts
// ---------------------------------------------------------------------------

/// Which cognitive module proposed a thought. Ordering is the competition
/// tie-break precedence: value learning beats emotion beats episodic, and
/// so on down to prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtSource {
    ValueLearning,
    Emotion,
    Episodic,
    Semantic,
    Working,
    Prediction,
    Default,
}

impl ThoughtSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValueLearning => "value_learning",
            Self::Emotion => "emotion",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Working => "working",
            Self::Prediction => "prediction",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for ThoughtSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate thought competing to become the turn's conscious content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub source: ThoughtSource,
    pub content: String,
    pub salience: f32,
    pub confidence: f32,
    pub emotion: Option<EmotionKind>,
    pub created_at: DateTime<Utc>,
}

impl Thought {
    /// Create a thought, clamping salience and confidence to [0, 1].
    pub fn new(source: ThoughtSource, content: impl Into<String>, salience: f32) -> Self {
        Self {
            source,
            content: content.into(),
            salience: salience.clamp(0.0, 1.0),
            confidence: 0.5,
            emotion: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_emotion(mut self, emotion: EmotionKind) -> Self {
        self.emotion = Some(emotion);
        self
    }

    /// Competition priority: salience weighted by the module's confidence.
    pub fn priority(&self) -> f32 {
        self.salience * self.confidence
    }

    /// The fallback thought used when no module proposed anything.
    pub fn fallback() -> Self {
        let mut t = Self::new(ThoughtSource::Default, "I do not know how to respond", 0.0);
        t.confidence = 0.0;
        t
    }
}
