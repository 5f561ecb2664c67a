//! Attention and salience scoring.
//!
//! One number in [0, 1] per input: a weighted sum of novelty, emotional
//! weight, length, and working-memory relevance, doubled when the Creator
//! is speaking. Inputs below the attention floor short-circuit the turn.

use eidolon_core::config::AttentionConfig;

/// The observable features of one input.
#[derive(Debug, Clone, Default)]
pub struct AttentionInput {
    /// 1 − max episodic similarity.
    pub novelty: f32,
    /// Current emotion intensity.
    pub emotional_weight: f32,
    /// Utterance length in characters.
    pub length_chars: usize,
    /// Best working-memory similarity.
    pub relevance: f32,
    pub from_creator: bool,
}

pub struct AttentionEngine {
    config: AttentionConfig,
}

impl AttentionEngine {
    pub fn new(config: AttentionConfig) -> Self {
        Self { config }
    }

    /// Length factor saturates around a short paragraph.
    fn length_factor(chars: usize) -> f32 {
        (chars as f32 / 200.0).min(1.0)
    }

    pub fn score(&self, input: &AttentionInput) -> f32 {
        let c = &self.config;
        let base = c.novelty_weight * input.novelty.clamp(0.0, 1.0)
            + c.emotion_weight * input.emotional_weight.clamp(0.0, 1.0)
            + c.length_weight * Self::length_factor(input.length_chars)
            + c.relevance_weight * input.relevance.clamp(0.0, 1.0);
        let boosted = if input.from_creator {
            base * c.creator_boost
        } else {
            base
        };
        boosted.clamp(0.0, 1.0)
    }

    pub fn floor(&self) -> f32 {
        self.config.attention_floor
    }
}
