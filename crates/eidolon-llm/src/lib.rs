//! Eidolon collaborators - the pluggable external services.
//!
//! The core treats speech, language generation, and embedding as opaque
//! contracts with deadlines. HTTP implementations live here alongside a
//! deterministic local embedder used offline and in tests.

pub mod http;
pub mod local;
pub mod provider;

pub use http::{HttpEmbedder, HttpLlm, HttpStt, HttpTts};
pub use local::LocalEmbedder;
pub use provider::{
    CollabError, CollabResult, Embedder, Llm, Stt, Transcript, Tts,
};
