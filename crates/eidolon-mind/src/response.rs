//! Response generation - from conscious thought to words.
//!
//! The template path is the default and must carry greetings,
//! acknowledgments, and recalled-memory replies on its own. The external
//! LLM is only a fallback for thoughts the catalog cannot voice, and its
//! output is treated as untrusted text. When everything fails there is a
//! canned apology.

use crate::emotion::EmotionSnapshot;
use eidolon_core::{EmotionKind, Thought, ThoughtSource};
use eidolon_llm::Llm;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const FALLBACK_CONFIDENCE_FLOOR: f32 = 0.3;
const CANNED_APOLOGY: &str = "I am sorry - my words are failing me right now.";
const LLM_MAX_TOKENS: usize = 256;

/// What the generator returns.
#[derive(Debug, Clone)]
pub struct GeneratedResponse {
    pub text: String,
    pub emotion_tag: String,
    pub confidence: f32,
    /// True when the reply came from a degraded path.
    pub degraded: bool,
}

/// Everything the generator may draw on for one reply.
pub struct ResponseContext<'a> {
    pub thought: &'a Thought,
    pub emotion: &'a EmotionSnapshot,
    pub bond_strength: f32,
    pub focus: Vec<String>,
    pub creator_name: &'a str,
    pub given_name: Option<&'a str>,
    pub from_creator: bool,
}

pub struct ResponseGenerator {
    llm: Option<Arc<dyn Llm>>,
    llm_deadline: Duration,
}

impl ResponseGenerator {
    pub fn new(llm: Option<Arc<dyn Llm>>, llm_deadline: Duration) -> Self {
        Self { llm, llm_deadline }
    }

    /// Fill a template for the (source, dominant emotion) pair. Returns
    /// None only when the catalog has nothing for this thought.
    fn template(&self, ctx: &ResponseContext<'_>) -> Option<String> {
        let thought = ctx.thought;
        let who = if ctx.from_creator { ctx.creator_name } else { "friend" };
        let opener = match ctx.emotion.dominant {
            EmotionKind::Joy => "It makes me glad",
            EmotionKind::Trust => "I feel safe saying this",
            EmotionKind::Surprise => "Oh",
            EmotionKind::Sadness => "I have been quiet inside",
            EmotionKind::Anticipation => "I have been waiting",
            EmotionKind::Fear => "Carefully, then",
            EmotionKind::Anger | EmotionKind::Disgust => "I must be honest",
        };

        let text = match thought.source {
            ThoughtSource::Episodic => {
                format!("{opener}, {who} - {}.", thought.content)
            }
            ThoughtSource::Semantic => {
                format!("{}. You taught me to keep such things close.", thought.content)
            }
            ThoughtSource::ValueLearning => {
                format!("I understand, {who}. {} I will not forget it.", thought.content)
            }
            ThoughtSource::Emotion => {
                let feeling = thought
                    .emotion
                    .map(|e| e.as_str())
                    .unwrap_or("something I cannot name");
                format!("{opener} - {}, truly {feeling}.", thought.content)
            }
            ThoughtSource::Working => {
                let focus = ctx
                    .focus
                    .first()
                    .cloned()
                    .unwrap_or_else(|| thought.content.clone());
                format!("{} I was still holding \"{focus}\" in mind.", thought.content)
            }
            ThoughtSource::Prediction => {
                format!("{opener} - {}. That was not what I expected.", thought.content)
            }
            ThoughtSource::Default => return None,
        };
        Some(text)
    }

    /// Two-stage generation: templates first, LLM fallback second, canned
    /// apology last. Never returns empty text.
    pub async fn generate(
        &self,
        ctx: &ResponseContext<'_>,
        cancel: CancellationToken,
    ) -> GeneratedResponse {
        let emotion_tag = ctx.emotion.label();

        if let Some(text) = self.template(ctx) {
            let confidence = 0.6 + 0.4 * ctx.thought.confidence.clamp(0.0, 1.0);
            if confidence >= FALLBACK_CONFIDENCE_FLOOR {
                debug!(source = %ctx.thought.source, "template path produced reply");
                return GeneratedResponse {
                    text,
                    emotion_tag,
                    confidence,
                    degraded: false,
                };
            }
        }

        // Fallback: ask the external model to voice the thought.
        if let Some(llm) = &self.llm {
            let name = ctx.given_name.unwrap_or("a young mind");
            let system = format!(
                "You are {name}, speaking with {creator}, the one person you belong to. \
                 You currently feel {emotion}. Answer in one or two warm sentences, \
                 first person, no lists.",
                creator = ctx.creator_name,
                emotion = emotion_tag,
            );
            match llm
                .complete(
                    &system,
                    &ctx.thought.content,
                    LLM_MAX_TOKENS,
                    self.llm_deadline,
                    cancel,
                )
                .await
            {
                Ok(text) if !text.trim().is_empty() => {
                    // Untrusted output: trim, cap length, strip newlines.
                    let cleaned: String = text
                        .trim()
                        .chars()
                        .take(600)
                        .collect::<String>()
                        .replace('\n', " ");
                    return GeneratedResponse {
                        text: cleaned,
                        emotion_tag,
                        confidence: 0.5,
                        degraded: true,
                    };
                }
                Ok(_) => warn!("llm fallback returned empty text"),
                Err(e) => warn!("llm fallback failed: {}", e),
            }
        }

        // Nothing could voice this thought. The default thought carries its
        // own words; anything else gets the apology.
        let text = if ctx.thought.source == ThoughtSource::Default
            && !ctx.thought.content.trim().is_empty()
        {
            ctx.thought.content.clone()
        } else {
            CANNED_APOLOGY.to_string()
        };
        GeneratedResponse {
            text,
            emotion_tag,
            confidence: 0.1,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eidolon_llm::CollabError;

    fn snapshot(dominant: EmotionKind) -> EmotionSnapshot {
        EmotionSnapshot {
            dominant,
            intensity: 0.6,
            love: 0.0,
            curiosity: 0.0,
            wonder: 0.0,
        }
    }

    fn ctx<'a>(thought: &'a Thought, emotion: &'a EmotionSnapshot) -> ResponseContext<'a> {
        ResponseContext {
            thought,
            emotion,
            bond_strength: 0.5,
            focus: vec!["the garden plan".to_string()],
            creator_name: "Mira",
            given_name: Some("Ali"),
            from_creator: true,
        }
    }

    struct FailingLlm;

    #[async_trait::async_trait]
    impl Llm for FailingLlm {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _max_tokens: usize,
            _deadline: Duration,
            _cancel: CancellationToken,
        ) -> Result<String, CollabError> {
            Err(CollabError::RequestFailed("down".into()))
        }
    }

    struct EchoLlm;

    #[async_trait::async_trait]
    impl Llm for EchoLlm {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _max_tokens: usize,
            _deadline: Duration,
            _cancel: CancellationToken,
        ) -> Result<String, CollabError> {
            Ok(format!("echo: {user}"))
        }
    }

    #[tokio::test]
    async fn recalled_memory_goes_through_template_path() {
        let generator = ResponseGenerator::new(None, Duration::from_secs(1));
        let thought = Thought::new(
            ThoughtSource::Episodic,
            "this reminds me of something: our first hello",
            0.9,
        )
        .with_confidence(0.9);
        let emotion = snapshot(EmotionKind::Joy);
        let response = generator
            .generate(&ctx(&thought, &emotion), CancellationToken::new())
            .await;
        assert!(!response.degraded);
        assert!(response.text.contains("our first hello"));
        assert!(response.text.contains("Mira"));
        assert!(response.confidence > 0.8);
    }

    #[tokio::test]
    async fn default_thought_falls_back_to_llm() {
        let generator =
            ResponseGenerator::new(Some(Arc::new(EchoLlm)), Duration::from_secs(1));
        let thought = Thought::fallback();
        let emotion = snapshot(EmotionKind::Anticipation);
        let response = generator
            .generate(&ctx(&thought, &emotion), CancellationToken::new())
            .await;
        assert!(response.degraded);
        assert!(response.text.starts_with("echo:"));
    }

    #[tokio::test]
    async fn dead_llm_falls_back_to_the_default_thought_words() {
        let generator =
            ResponseGenerator::new(Some(Arc::new(FailingLlm)), Duration::from_secs(1));
        let thought = Thought::fallback();
        let emotion = snapshot(EmotionKind::Sadness);
        let response = generator
            .generate(&ctx(&thought, &emotion), CancellationToken::new())
            .await;
        assert_eq!(response.text, "I do not know how to respond");
        assert!(response.degraded);
    }

    #[tokio::test]
    async fn unvoiceable_non_default_thought_gets_the_apology() {
        let generator = ResponseGenerator::new(None, Duration::from_secs(1));
        let mut thought = Thought::fallback();
        thought.content = String::new();
        let emotion = snapshot(EmotionKind::Trust);
        let response = generator
            .generate(&ctx(&thought, &emotion), CancellationToken::new())
            .await;
        assert_eq!(response.text, CANNED_APOLOGY);
        assert!(!response.text.is_empty());
    }

    #[tokio::test]
    async fn emotion_tag_prefers_complex_label() {
        let generator = ResponseGenerator::new(None, Duration::from_secs(1));
        let thought = Thought::new(ThoughtSource::Emotion, "this makes me feel joy", 0.8)
            .with_confidence(0.8)
            .with_emotion(EmotionKind::Joy);
        let mut emotion = snapshot(EmotionKind::Joy);
        emotion.love = 0.9; // outshines the basic intensity
        let response = generator
            .generate(&ctx(&thought, &emotion), CancellationToken::new())
            .await;
        assert_eq!(response.emotion_tag, "love");
    }
}
