//! Global workspace - the competition and broadcast hub.
//!
//! Modules register as subscribers. An external input fans out to every
//! subscriber's propose handler in parallel under a hard per-handler
//! timeout; the returned thoughts compete; exactly one winner is broadcast
//! back to every subscriber. The hub holds no module state - only the
//! integration counter (phi) and the last winner.

use chrono::{DateTime, Utc};
use eidolon_core::Thought;
use eidolon_memory::Embedding;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The stimulus fanned out to every subscriber in phase 5.
#[derive(Debug, Clone)]
pub struct WorkspaceInput {
    pub text: String,
    pub embedding: Embedding,
    pub from_creator: bool,
    pub prediction_error: f32,
    pub timestamp: DateTime<Utc>,
}

impl WorkspaceInput {
    pub fn for_tests(text: &str, from_creator: bool) -> Self {
        Self {
            text: text.to_string(),
            embedding: Embedding::zeros(8),
            from_creator,
            prediction_error: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// A cognitive module attached to the workspace.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &'static str;

    /// Offer at most one thought for this input.
    async fn propose(&self, input: Arc<WorkspaceInput>) -> Option<Thought>;

    /// Receive the winning conscious thought. Best-effort.
    async fn on_broadcast(&self, thought: &Thought);
}

pub struct GlobalWorkspace {
    subscribers: Vec<Arc<dyn Subscriber>>,
    per_handler_timeout: Duration,
    /// Phi: completed integrations since boot.
    integrations: AtomicU64,
    last_winner: Mutex<Option<Thought>>,
}

impl GlobalWorkspace {
    pub fn new(per_handler_timeout: Duration) -> Self {
        Self {
            subscribers: Vec::new(),
            per_handler_timeout,
            integrations: AtomicU64::new(0),
            last_winner: Mutex::new(None),
        }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) {
        debug!(module = subscriber.name(), "workspace subscriber registered");
        self.subscribers.push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Fan the input out to every propose handler in parallel. Handlers
    /// that miss the timeout are dropped; the loop proceeds without them.
    pub async fn broadcast_external_input(&self, input: Arc<WorkspaceInput>) -> Vec<Thought> {
        let handles: Vec<_> = self
            .subscribers
            .iter()
            .map(|subscriber| {
                let subscriber = subscriber.clone();
                let input = input.clone();
                let deadline = self.per_handler_timeout;
                tokio::spawn(async move {
                    let name = subscriber.name();
                    match tokio::time::timeout(deadline, subscriber.propose(input)).await {
                        Ok(proposal) => proposal,
                        Err(_) => {
                            warn!(module = name, "proposal dropped: handler timeout");
                            None
                        }
                    }
                })
            })
            .collect();

        let mut thoughts = Vec::new();
        for handle in handles {
            if let Ok(Some(thought)) = handle.await {
                thoughts.push(thought);
            }
        }
        thoughts
    }

    /// Competition and winner selection. Priority is salience × confidence;
    /// ties break by source precedence, then by earlier creation time. An
    /// empty field yields the fallback thought at priority zero.
    pub fn compete_and_select(&self, mut thoughts: Vec<Thought>) -> Thought {
        if thoughts.is_empty() {
            warn!("no thoughts proposed this cycle; using fallback");
            return Thought::fallback();
        }
        thoughts.sort_by(|a, b| {
            b.priority()
                .partial_cmp(&a.priority())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        let winner = thoughts.into_iter().next().expect("non-empty");
        info!(
            source = %winner.source,
            priority = winner.priority(),
            "conscious thought selected"
        );
        winner
    }

    /// Broadcast the conscious thought back to every subscriber. Handler
    /// errors and overruns are logged, never fatal.
    pub async fn broadcast_conscious(&self, thought: &Thought) {
        for subscriber in &self.subscribers {
            let name = subscriber.name();
            if tokio::time::timeout(self.per_handler_timeout, subscriber.on_broadcast(thought))
                .await
                .is_err()
            {
                warn!(module = name, "broadcast handler timed out");
            }
        }
        *self.last_winner.lock() = Some(thought.clone());
    }

    /// Record one completed integration (a finished turn).
    pub fn record_integration(&self) -> u64 {
        self.integrations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn phi(&self) -> u64 {
        self.integrations.load(Ordering::Relaxed)
    }

    pub fn last_winner(&self) -> Option<Thought> {
        self.last_winner.lock().clone()
    }
}
