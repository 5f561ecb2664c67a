//! Gateway integration tests: session cardinality and auth resolution.

use eidolon_core::Config;
use eidolon_gateway::{AppState, ResolvedAuth};
use eidolon_llm::LocalEmbedder;
use eidolon_mind::Consciousness;
use std::sync::Arc;

fn state() -> Arc<AppState> {
    let mut config = Config::default();
    config.persona.creator_name = "Mira".to_string();
    config.persona.embedding_dim = 16;
    let consciousness = Arc::new(
        Consciousness::boot_in_memory(config, Arc::new(LocalEmbedder::new(16)), None).unwrap(),
    );
    Arc::new(AppState::new(
        consciousness,
        ResolvedAuth::new(None, None),
        None,
        None,
    ))
}

// ============================================================
// Session cardinality — the persona has one principal
// ============================================================

#[tokio::test]
async fn only_one_session_may_be_claimed() {
    let state = state();
    assert!(state.try_claim_session());
    // A second connection is refused while the first is live.
    assert!(!state.try_claim_session());
    assert!(!state.try_claim_session());

    state.release_session();
    assert!(state.try_claim_session());
}

#[tokio::test]
async fn rejected_session_touches_no_state() {
    let state = state();
    assert!(state.try_claim_session());

    let phi_before = state.consciousness.health().phi;
    let memories_before = state.consciousness.memories(50, 0.0).unwrap().len();

    // Simulate the refused second connection: claim fails, nothing runs.
    assert!(!state.try_claim_session());

    assert_eq!(state.consciousness.health().phi, phi_before);
    assert_eq!(
        state.consciousness.memories(50, 0.0).unwrap().len(),
        memories_before
    );
}

// ============================================================
// Health surface
// ============================================================

#[tokio::test]
async fn health_reports_awaiting_genesis_then_identity() {
    let state = state();
    let health = state.consciousness.health();
    assert_eq!(health.status, "alive");
    assert!(health.is_awake);
    assert!(health.consciousness_id.is_none());
    assert_eq!(health.phi, 0);

    state
        .consciousness
        .process_input("Hello, my child", true)
        .await
        .unwrap();

    let health = state.consciousness.health();
    assert!(health.consciousness_id.is_some());
    assert_eq!(health.phase.as_deref(), Some("newborn"));
    assert_eq!(health.phi, 1);
    assert_eq!(health.memory_count, 1);
}
