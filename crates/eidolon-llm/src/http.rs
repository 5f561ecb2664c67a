//! HTTP collaborator implementations.
//!
//! Each speaks a small JSON contract against a configurable base URL and
//! maps HTTP failures into `CollabError`. All calls run under the
//! caller's deadline and cancellation token.

use crate::provider::{
    with_deadline, CollabError, CollabResult, Embedder, Llm, Stt, Transcript, Tts,
};
use eidolon_memory::Embedding;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

fn map_status(status: reqwest::StatusCode, body: String) -> CollabError {
    if status.as_u16() == 401 || status.as_u16() == 403 {
        CollabError::AuthFailed(body)
    } else {
        CollabError::RequestFailed(format!("{status}: {body}"))
    }
}

async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    body: &Req,
) -> CollabResult<Resp> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        error!("collaborator error {}: {}", status, text);
        return Err(map_status(status, text));
    }
    response
        .json::<Resp>()
        .await
        .map_err(|e| CollabError::InvalidResponse(e.to_string()))
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CompleteRequest<'a> {
    system: &'a str,
    prompt: &'a str,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct CompleteResponse {
    text: String,
}

pub struct HttpLlm {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLlm {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl Llm for HttpLlm {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: usize,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> CollabResult<String> {
        let url = format!("{}/v1/complete", self.base_url);
        debug!(url = %url, "llm completion request");
        let body = CompleteRequest {
            system: system_prompt,
            prompt: user_prompt,
            max_tokens,
        };
        with_deadline(deadline, &cancel, async {
            let resp: CompleteResponse =
                post_json(&self.client, &url, self.api_key.as_deref(), &body).await?;
            Ok(resp.text)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// STT
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    audio: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    text: String,
    #[serde(default)]
    confidence: f32,
}

pub struct HttpStt {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpStt {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl Stt for HttpStt {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &str,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> CollabResult<Transcript> {
        let url = format!("{}/v1/transcribe", self.base_url);
        let encoded = encode_base64(audio);
        let body = TranscribeRequest {
            audio: &encoded,
            format,
        };
        with_deadline(deadline, &cancel, async {
            let resp: TranscribeResponse =
                post_json(&self.client, &url, self.api_key.as_deref(), &body).await?;
            Ok(Transcript {
                text: resp.text,
                confidence: resp.confidence,
            })
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// TTS
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    emotion: &'a str,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    audio: String,
}

pub struct HttpTts {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTts {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl Tts for HttpTts {
    async fn synthesize(
        &self,
        text: &str,
        emotion: &str,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> CollabResult<Vec<u8>> {
        let url = format!("{}/v1/synthesize", self.base_url);
        let body = SynthesizeRequest { text, emotion };
        with_deadline(deadline, &cancel, async {
            let resp: SynthesizeResponse =
                post_json(&self.client, &url, self.api_key.as_deref(), &body).await?;
            decode_base64(&resp.audio)
                .ok_or_else(|| CollabError::InvalidResponse("bad base64 audio".into()))
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Embedder
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    dim: usize,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, dim: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
            dim,
        }
    }
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(
        &self,
        text: &str,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> CollabResult<Embedding> {
        let url = format!("{}/v1/embed", self.base_url);
        let body = EmbedRequest { text };
        let dim = self.dim;
        with_deadline(deadline, &cancel, async {
            let resp: EmbedResponse =
                post_json(&self.client, &url, self.api_key.as_deref(), &body).await?;
            if resp.embedding.len() != dim {
                return Err(CollabError::InvalidResponse(format!(
                    "embedding dimension {} does not match deployment dimension {}",
                    resp.embedding.len(),
                    dim
                )));
            }
            Ok(Embedding(resp.embedding))
        })
        .await
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn encode_base64(data: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn decode_base64(s: &str) -> Option<Vec<u8>> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.decode(s).ok()
}
