//! The WebSocket session.
//!
//! Exactly one authenticated session may be live at a time; a second
//! connection gets a busy error and is closed without touching any state.
//! Inside a session, text and voice messages run the consciousness loop
//! and control messages steer the server. A long quiet span may push one
//! proactive message.

use crate::server::AppState;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use base64::Engine as _;
use chrono::Utc;
use eidolon_core::{AudioFormat, ClientMessage, ControlAction, Error, ServerMessage};
use eidolon_mind::Reply;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type WsTx = SplitSink<WebSocket, WsMessage>;

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Send one server message; false means the client is gone.
async fn send(tx: &mut WsTx, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => tx.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("failed to serialize server message: {}", e);
            true
        }
    }
}

/// Handle one WebSocket connection for its whole lifetime.
pub async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // The persona has one principal: a second session is refused before
    // any state is touched.
    if !state.try_claim_session() {
        warn!("second session attempt refused");
        let busy = ServerMessage::error("busy: another session is already open", now_ts());
        let _ = send(&mut ws_tx, &busy).await;
        let _ = ws_tx.close().await;
        return;
    }

    info!("session opened");
    let _ = send(&mut ws_tx, &ServerMessage::connected(now_ts())).await;

    let mut paused = false;
    let mut proactive_tick = tokio::time::interval(Duration::from_secs(30));
    proactive_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let Some(Ok(frame)) = incoming else {
                    break;
                };
                match frame {
                    WsMessage::Text(text) => {
                        let shutdown =
                            handle_text_frame(&mut ws_tx, &state, text.as_str(), &mut paused).await;
                        if shutdown {
                            break;
                        }
                    }
                    WsMessage::Close(_) => break,
                    // Axum answers pings itself.
                    _ => {}
                }
            }
            _ = proactive_tick.tick() => {
                if paused {
                    continue;
                }
                if let Some((content, emotion)) = state.consciousness.proactive() {
                    info!("pushing proactive message");
                    if !send(&mut ws_tx, &ServerMessage::proactive(content, emotion, now_ts())).await {
                        break;
                    }
                }
            }
        }
    }

    state.release_session();
    info!("session closed");
}

/// Returns true when the session asked the server to shut down.
async fn handle_text_frame(
    tx: &mut WsTx,
    state: &Arc<AppState>,
    raw: &str,
    paused: &mut bool,
) -> bool {
    let message = match serde_json::from_str::<ClientMessage>(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!("unparseable client message: {}", e);
            let reply = ServerMessage::error(format!("invalid message: {e}"), now_ts());
            let _ = send(tx, &reply).await;
            return false;
        }
    };

    match message {
        ClientMessage::Text { content, .. } => {
            if *paused {
                let _ = send(tx, &ServerMessage::error("paused", now_ts())).await;
                return false;
            }
            let reply = run_turn(state, &content).await;
            let _ = send(
                tx,
                &ServerMessage::text(reply.text, reply.emotion, now_ts()),
            )
            .await;
        }
        ClientMessage::Voice { audio, format, .. } => {
            if *paused {
                let _ = send(tx, &ServerMessage::error("paused", now_ts())).await;
                return false;
            }
            let response = run_voice_turn(state, &audio, format).await;
            let _ = send(tx, &response).await;
        }
        ClientMessage::Control { action } => match action {
            ControlAction::Pause => {
                *paused = true;
                info!("session paused");
            }
            ControlAction::Resume => {
                *paused = false;
                info!("session resumed");
            }
            ControlAction::Sleep => {
                info!("sleep requested; running consolidation");
                match state.consciousness.consolidate_now().await {
                    Ok(count) => info!(archived = count, "consolidation on sleep"),
                    Err(e) => warn!("consolidation failed: {}", e),
                }
            }
            ControlAction::Shutdown => {
                info!("shutdown requested by session");
                return true;
            }
        },
    }
    false
}

async fn run_turn(state: &Arc<AppState>, content: &str) -> Reply {
    match state.consciousness.process_input(content, true).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("turn failed: {}", e);
            let text = match e {
                Error::Storage(_) => {
                    "Something in me failed to hold on to that. Please say it again.".to_string()
                }
                _ => "I lost the thread of that one. Please try again.".to_string(),
            };
            Reply {
                text,
                emotion: "sadness".to_string(),
                confidence: 0.0,
                degraded: true,
                cached: false,
            }
        }
    }
}

async fn run_voice_turn(state: &Arc<AppState>, audio_b64: &str, format: AudioFormat) -> ServerMessage {
    let Some(stt) = &state.stt else {
        return ServerMessage::error("voice is not configured on this deployment", now_ts());
    };
    let Ok(audio) = base64::engine::general_purpose::STANDARD.decode(audio_b64) else {
        return ServerMessage::error("invalid audio encoding", now_ts());
    };

    let format_str = match format {
        AudioFormat::Opus => "opus",
        AudioFormat::Wav => "wav",
    };
    let deadline = Duration::from_secs(state.consciousness.config().deadlines.stt_deadline_s);
    let transcript = match stt
        .transcribe(&audio, format_str, deadline, CancellationToken::new())
        .await
    {
        Ok(t) => t,
        Err(e) => {
            warn!("stt degraded: {}", e);
            // An unintelligible utterance is treated as empty input.
            eidolon_llm::Transcript {
                text: String::new(),
                confidence: 0.0,
            }
        }
    };

    let reply = match state
        .consciousness
        .process_transcript(&transcript.text, transcript.confidence, true)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!("voice turn failed: {}", e);
            Reply {
                text: "I lost the thread of that one. Please try again.".to_string(),
                emotion: "sadness".to_string(),
                confidence: 0.0,
                degraded: true,
                cached: false,
            }
        }
    };

    // Voice in, voice out when the synthesizer is available.
    if let Some(tts) = &state.tts {
        let tts_deadline =
            Duration::from_secs(state.consciousness.config().deadlines.tts_deadline_s);
        match tts
            .synthesize(&reply.text, &reply.emotion, tts_deadline, CancellationToken::new())
            .await
        {
            Ok(audio) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(audio);
                return ServerMessage::voice(reply.text, encoded, reply.emotion, now_ts());
            }
            Err(e) => warn!("tts degraded to text reply: {}", e),
        }
    }
    ServerMessage::text(reply.text, reply.emotion, now_ts())
}
