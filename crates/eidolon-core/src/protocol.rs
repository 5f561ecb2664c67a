//! Session wire protocol — framed JSON messages over the WebSocket
//!
//! Client → Server:
//!   { "type": "text", "content": "Hello", "timestamp": 1712000000 }
//!   { "type": "voice", "audio": "<base64>", "format": "opus", "timestamp": 1712000000 }
//!   { "type": "control", "action": "pause" }
//!
//! Server → Client:
//!   { "type": "connected", "timestamp": 1712000000 }
//!   { "type": "text", "content": "...", "emotion": "joy", "timestamp": 1712000000 }
//!   { "type": "voice", "text": "...", "audio": "<base64>", "emotion": "joy", "timestamp": 1712000000 }
//!   { "type": "proactive", "content": "...", "emotion": "curiosity", "timestamp": 1712000000 }
//!
//! Voice audio is base64 in both directions; this is a client-compatibility
//! requirement and not negotiable.

use serde::{Deserialize, Serialize};

/// Audio container formats accepted from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Opus,
    Wav,
}

/// Session control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Pause,
    Resume,
    Sleep,
    Shutdown,
}

/// Client-to-server messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Text {
        content: String,
        #[serde(default)]
        timestamp: i64,
    },
    Voice {
        audio: String,
        format: AudioFormat,
        #[serde(default)]
        timestamp: i64,
    },
    Control {
        action: ControlAction,
    },
}

/// Server-to-client messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Connected {
        timestamp: i64,
    },
    Text {
        content: String,
        emotion: String,
        timestamp: i64,
    },
    Voice {
        text: String,
        audio: String,
        emotion: String,
        timestamp: i64,
    },
    Proactive {
        content: String,
        emotion: String,
        timestamp: i64,
    },
    Error {
        message: String,
        timestamp: i64,
    },
}

impl ServerMessage {
    pub fn connected(timestamp: i64) -> Self {
        Self::Connected { timestamp }
    }

    pub fn text(content: impl Into<String>, emotion: impl Into<String>, timestamp: i64) -> Self {
        Self::Text {
            content: content.into(),
            emotion: emotion.into(),
            timestamp,
        }
    }

    pub fn voice(
        text: impl Into<String>,
        audio: impl Into<String>,
        emotion: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self::Voice {
            text: text.into(),
            audio: audio.into(),
            emotion: emotion.into(),
            timestamp,
        }
    }

    pub fn proactive(content: impl Into<String>, emotion: impl Into<String>, timestamp: i64) -> Self {
        Self::Proactive {
            content: content.into(),
            emotion: emotion.into(),
            timestamp,
        }
    }

    pub fn error(message: impl Into<String>, timestamp: i64) -> Self {
        Self::Error {
            message: message.into(),
            timestamp,
        }
    }
}
