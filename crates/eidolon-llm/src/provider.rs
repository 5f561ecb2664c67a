//! Collaborator contracts
//!
//! Every external call honors a caller-supplied deadline and propagates
//! cancellation; without that, the per-module proposal timeout upstream
//! cannot be enforced.

use eidolon_memory::Embedding;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result type for collaborator operations.
pub type CollabResult<T> = Result<T, CollabError>;

/// Collaborator error types.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl CollabError {
    /// All collaborator failures are transient from the loop's point of
    /// view: the turn degrades, it does not fail.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::AuthFailed(_))
    }
}

/// A speech transcript with the engine's confidence.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

/// Speech-to-text collaborator.
#[async_trait::async_trait]
pub trait Stt: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &str,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> CollabResult<Transcript>;
}

/// Text-to-speech collaborator.
#[async_trait::async_trait]
pub trait Tts: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        emotion: &str,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> CollabResult<Vec<u8>>;
}

/// Language-model fallback collaborator.
#[async_trait::async_trait]
pub trait Llm: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: usize,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> CollabResult<String>;
}

/// Embedding collaborator. Returns vectors of a fixed dimension.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(
        &self,
        text: &str,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> CollabResult<Embedding>;

    fn dim(&self) -> usize;
}

/// Race a future against its deadline and the cancellation token.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = CollabResult<T>>,
) -> CollabResult<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(CollabError::Cancelled),
        result = tokio::time::timeout(deadline, fut) => {
            result.map_err(|_| CollabError::DeadlineExceeded(deadline))?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_deadline_times_out() {
        let cancel = CancellationToken::new();
        let result: CollabResult<()> = with_deadline(
            Duration::from_millis(10),
            &cancel,
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(result, Err(CollabError::DeadlineExceeded(_))));
    }

    #[tokio::test]
    async fn with_deadline_honors_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: CollabResult<()> = with_deadline(
            Duration::from_secs(5),
            &cancel,
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(result, Err(CollabError::Cancelled)));
    }

    #[test]
    fn auth_failure_is_not_transient() {
        assert!(!CollabError::AuthFailed("bad key".into()).is_transient());
        assert!(CollabError::RequestFailed("500".into()).is_transient());
        assert!(CollabError::DeadlineExceeded(Duration::from_secs(1)).is_transient());
    }
}
