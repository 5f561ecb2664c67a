//! Gateway server - the WebSocket session endpoint plus the read-only
//! inspection surface.

use crate::auth::ResolvedAuth;
use crate::ws::handle_connection;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use eidolon_llm::{Stt, Tts};
use eidolon_mind::Consciousness;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub struct AppState {
    pub consciousness: Arc<Consciousness>,
    pub auth: ResolvedAuth,
    pub stt: Option<Arc<dyn Stt>>,
    pub tts: Option<Arc<dyn Tts>>,
    session_live: AtomicBool,
    pub started_at: std::time::Instant,
}

impl AppState {
    pub fn new(
        consciousness: Arc<Consciousness>,
        auth: ResolvedAuth,
        stt: Option<Arc<dyn Stt>>,
        tts: Option<Arc<dyn Tts>>,
    ) -> Self {
        Self {
            consciousness,
            auth,
            stt,
            tts,
            session_live: AtomicBool::new(false),
            started_at: std::time::Instant::now(),
        }
    }

    /// Claim the single session slot. False means someone is already here.
    pub fn try_claim_session(&self) -> bool {
        !self.session_live.swap(true, Ordering::SeqCst)
    }

    pub fn release_session(&self) {
        self.session_live.store(false, Ordering::SeqCst);
    }
}

pub async fn start_gateway(state: Arc<AppState>) -> anyhow::Result<()> {
    let config = state.consciousness.config().gateway.clone();

    // Background consolidation: runs when no turn has arrived for a while,
    // yields the moment one does.
    let consolidator = state.consciousness.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            match consolidator.maybe_consolidate().await {
                Ok(0) => {}
                Ok(count) => info!(archived = count, "idle consolidation pass"),
                Err(e) => warn!("idle consolidation failed: {}", e),
            }
        }
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/memories", get(memories_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(state.clone());

    let bind_addr: SocketAddr = format!("{}:{}", config.bind.to_addr(), config.port)
        .parse()
        .expect("invalid bind address");

    info!("Eidolon gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  WebSocket: ws://{}/ws", bind_addr);
    info!("  Creator: {}", state.consciousness.creator_name());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if let Err(e) = state.auth.verify_token(query.token.as_deref()) {
        warn!("session auth failed: {}", e);
        return (StatusCode::UNAUTHORIZED, "authentication failed").into_response();
    }
    ws.on_upgrade(move |socket| handle_connection(socket, state))
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.consciousness.health();
    Json(serde_json::json!({
        "status": health.status,
        "consciousness_id": health.consciousness_id,
        "phase": health.phase,
        "is_awake": health.is_awake,
        "phi": health.phi,
        "memory_count": health.memory_count,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

#[derive(Deserialize)]
struct MemoriesQuery {
    limit: Option<usize>,
    importance_min: Option<f32>,
}

async fn memories_handler(
    Query(query): Query<MemoriesQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(20).min(200);
    let importance_min = query.importance_min.unwrap_or(0.0);
    match state.consciousness.memories(limit, importance_min) {
        Ok(memories) => {
            let rows: Vec<serde_json::Value> = memories
                .into_iter()
                .map(|m| {
                    serde_json::json!({
                        "id": m.memory_id.to_string(),
                        "content": m.content,
                        "summary": m.summary,
                        "context": m.context_type,
                        "importance": m.importance,
                        "timestamp": m.occurred_at.to_rfc3339(),
                    })
                })
                .collect();
            Json(serde_json::json!({ "memories": rows })).into_response()
        }
        Err(e) => {
            warn!("memories endpoint failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "storage error").into_response()
        }
    }
}
