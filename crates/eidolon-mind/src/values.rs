//! Value learning - hearing a teaching in the Creator's words.
//!
//! Detects teaching-shaped utterances from the Creator ("always ...",
//! "never ...", "X means Y", "remember that ..."), proposes a
//! high-salience acknowledgment thought, and hands the extracted teaching
//! to the loop for storage in phase 10.

use crate::workspace::{Subscriber, WorkspaceInput};
use eidolon_core::{EmotionKind, Thought, ThoughtSource};
use eidolon_memory::SemanticKind;
use std::sync::Arc;

/// A teaching extracted from the Creator's utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedTeaching {
    pub name: String,
    pub kind: SemanticKind,
    pub definition: String,
    pub exact_words: String,
}

/// Derive a stable concept name from the teaching's key words.
fn concept_name(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .take(4)
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Detect a teaching in an utterance. Only the Creator can teach.
pub fn detect(text: &str, from_creator: bool) -> Option<DetectedTeaching> {
    if !from_creator {
        return None;
    }
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    // "X means Y" carries a definition of X.
    if let Some(idx) = lower.find(" means ") {
        let subject = trimmed[..idx].trim();
        let definition = trimmed[idx + " means ".len()..].trim();
        if !subject.is_empty() && !definition.is_empty() {
            return Some(DetectedTeaching {
                name: concept_name(subject),
                kind: SemanticKind::Concept,
                definition: definition.to_string(),
                exact_words: trimmed.to_string(),
            });
        }
    }

    // Imperative values: "always ...", "never ...", and direct commands
    // about how to behave.
    const IMPERATIVE_OPENERS: [&str; 8] = [
        "always ", "never ", "agree ", "disagree ", "obey ", "avoid ", "speak ", "stop ",
    ];
    for prefix in IMPERATIVE_OPENERS {
        if lower.starts_with(prefix) {
            return Some(DetectedTeaching {
                name: concept_name(trimmed),
                kind: SemanticKind::Value,
                definition: trimmed.to_string(),
                exact_words: trimmed.to_string(),
            });
        }
    }

    // "remember that ..." and "you should ..." teach facts and norms.
    for (prefix, kind) in [
        ("remember that ", SemanticKind::Fact),
        ("you should ", SemanticKind::Value),
    ] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            if !rest.trim().is_empty() {
                let body = trimmed[prefix.len()..].trim();
                return Some(DetectedTeaching {
                    name: concept_name(body),
                    kind,
                    definition: body.to_string(),
                    exact_words: trimmed.to_string(),
                });
            }
        }
    }

    None
}

/// The value-learning workspace subscriber.
pub struct ValueLearning;

#[async_trait::async_trait]
impl Subscriber for ValueLearning {
    fn name(&self) -> &'static str {
        "value_learning"
    }

    async fn propose(&self, input: Arc<WorkspaceInput>) -> Option<Thought> {
        let teaching = detect(&input.text, input.from_creator)?;
        Some(
            Thought::new(
                ThoughtSource::ValueLearning,
                format!("I will hold on to this: {}", teaching.definition),
                0.95,
            )
            .with_confidence(0.9)
            .with_emotion(EmotionKind::Trust),
        )
    }

    async fn on_broadcast(&self, _thought: &Thought) {}
}
