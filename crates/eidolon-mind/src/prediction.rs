//! Prediction engine and world model.
//!
//! The world model maps a coarse situation key (bag of stems over recent
//! context) to a running centroid and variance of next-utterance embeddings.
//! Prediction error is the semantic distance between the expectation and
//! what actually arrived; large errors propose a surprise thought.

use crate::workspace::{Subscriber, WorkspaceInput};
use eidolon_core::{EmotionKind, Thought, ThoughtSource};
use eidolon_llm::local::stems;
use eidolon_memory::Embedding;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Normalizing constant for variance → confidence. Unit-norm embeddings
/// keep squared distances within [0, 4]; in practice they sit well under 2.
const VARIANCE_SCALE: f32 = 2.0;

/// Build the coarse situation key from recent context strings.
pub fn situation_key(context: &[&str]) -> String {
    let mut all: Vec<String> = context.iter().flat_map(|text| stems(text)).collect();
    all.sort();
    all.dedup();
    all.join(" ")
}

#[derive(Debug, Clone)]
struct EntryStats {
    centroid: Vec<f32>,
    variance: f32,
    samples: u32,
}

/// The learned expectation table.
#[derive(Default)]
pub struct WorldModel {
    entries: HashMap<String, EntryStats>,
}

impl WorldModel {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expected next-utterance embedding and the confidence in it.
    /// Confidence is 1 − normalized variance; a key never seen predicts
    /// nothing.
    pub fn predict(&self, key: &str) -> Option<(Embedding, f32)> {
        self.entries.get(key).map(|stats| {
            let confidence = (1.0 - (stats.variance / VARIANCE_SCALE)).clamp(0.0, 1.0);
            (Embedding(stats.centroid.clone()), confidence)
        })
    }

    /// Online mean/variance update at the given learning rate.
    pub fn update(&mut self, key: &str, actual: &Embedding, learning_rate: f32) {
        match self.entries.get_mut(key) {
            Some(stats) => {
                let expected = Embedding(stats.centroid.clone());
                let distance = expected.distance(actual);
                for (c, a) in stats.centroid.iter_mut().zip(actual.0.iter()) {
                    *c += learning_rate * (a - *c);
                }
                stats.variance += learning_rate * (distance * distance - stats.variance);
                stats.samples += 1;
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    EntryStats {
                        centroid: actual.0.clone(),
                        variance: 0.5,
                        samples: 1,
                    },
                );
            }
        }
    }
}

pub struct PredictionEngine {
    model: Mutex<WorldModel>,
    error_threshold: f32,
    learning_rate: f32,
    /// Error measured for the current turn, consumed by the proposal.
    last_error: Mutex<f32>,
}

impl PredictionEngine {
    pub fn new(error_threshold: f32, learning_rate: f32) -> Arc<Self> {
        Arc::new(Self {
            model: Mutex::new(WorldModel::default()),
            error_threshold,
            learning_rate,
            last_error: Mutex::new(0.0),
        })
    }

    /// Compare the expectation for this context against what arrived.
    /// Unseen situations carry no expectation and no error.
    pub fn measure_error(&self, context: &[&str], actual: &Embedding) -> f32 {
        let key = situation_key(context);
        let error = match self.model.lock().predict(&key) {
            Some((expected, confidence)) => expected.distance(actual) * confidence.max(0.25),
            None => 0.0,
        };
        *self.last_error.lock() = error;
        debug!(error, "prediction error measured");
        error
    }

    /// Learn: fold the actual embedding into the context's expectation.
    pub fn learn(&self, context: &[&str], actual: &Embedding) {
        let key = situation_key(context);
        self.model.lock().update(&key, actual, self.learning_rate);
    }

    pub fn last_error(&self) -> f32 {
        *self.last_error.lock()
    }

    pub fn threshold(&self) -> f32 {
        self.error_threshold
    }
}

#[async_trait::async_trait]
impl Subscriber for PredictionEngine {
    fn name(&self) -> &'static str {
        "prediction"
    }

    async fn propose(&self, input: Arc<WorkspaceInput>) -> Option<Thought> {
        let error = input.prediction_error;
        if error <= self.error_threshold {
            return None;
        }
        Some(
            Thought::new(
                ThoughtSource::Prediction,
                "I did not expect that at all",
                error,
            )
            .with_confidence(0.9)
            .with_emotion(EmotionKind::Surprise),
        )
    }

    async fn on_broadcast(&self, _thought: &Thought) {}
}
