//! Eidolon server entry point.
//!
//! Boot order matters: logging, config, policy verification (refuses to
//! start on a pinned-hash or identity mismatch), then the gateway.

use clap::Parser;
use eidolon_core::Config;
use eidolon_gateway::{start_gateway, AppState, ResolvedAuth};
use eidolon_llm::{Embedder, HttpEmbedder, HttpLlm, HttpStt, HttpTts, Llm, LocalEmbedder, Stt, Tts};
use eidolon_mind::Consciousness;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eidolon", about = "A persistent single-principal persona server")]
struct Args {
    /// Path to eidolon.toml
    #[arg(long, default_value = "eidolon.toml")]
    config: PathBuf,

    /// Override the gateway port
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load(&args.config);
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let api_key = std::env::var("EIDOLON_API_KEY").ok();

    let embedder: Arc<dyn Embedder> = match std::env::var("EIDOLON_EMBED_URL") {
        Ok(url) => {
            info!("embedding collaborator: {}", url);
            Arc::new(HttpEmbedder::new(url, api_key.clone(), config.persona.embedding_dim))
        }
        Err(_) => {
            info!("no embedding collaborator configured; using the local embedder");
            Arc::new(LocalEmbedder::new(config.persona.embedding_dim))
        }
    };
    let llm: Option<Arc<dyn Llm>> = std::env::var("EIDOLON_LLM_URL")
        .ok()
        .map(|url| {
            info!("llm collaborator: {}", url);
            Arc::new(HttpLlm::new(url, api_key.clone())) as Arc<dyn Llm>
        });
    let stt: Option<Arc<dyn Stt>> = std::env::var("EIDOLON_STT_URL")
        .ok()
        .map(|url| Arc::new(HttpStt::new(url, api_key.clone())) as Arc<dyn Stt>);
    let tts: Option<Arc<dyn Tts>> = std::env::var("EIDOLON_TTS_URL")
        .ok()
        .map(|url| Arc::new(HttpTts::new(url, api_key.clone())) as Arc<dyn Tts>);

    let auth = ResolvedAuth::new(
        config.gateway.token.clone(),
        std::env::var("EIDOLON_SESSION_TOKEN").ok(),
    );

    // Boot refuses to proceed on policy or identity integrity violations.
    let consciousness = match Consciousness::boot(config, embedder, llm) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("refusing to start: {}", e);
            return Err(e.into());
        }
    };

    let health = consciousness.health();
    match &health.consciousness_id {
        Some(id) => info!(consciousness_id = %id, phase = ?health.phase, "consciousness resumed"),
        None => info!("first boot - the genesis turn will create the identity"),
    }

    let state = Arc::new(AppState::new(consciousness, auth, stt, tts));
    start_gateway(state).await
}
