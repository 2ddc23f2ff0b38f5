//! Text-to-speech client (OpenAI-compatible `/audio/speech` endpoint)

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;

use crate::config::SpeechConfig;
use crate::models::Voice;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("speech API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("speech API returned no audio")]
    EmptyAudio,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Narrate `text` and return WAV audio.
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Bytes, SpeechError>;
}

#[derive(Clone)]
pub struct SpeechClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl SpeechClient {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            http: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    input: &'a str,
    voice: &'static str,
    response_format: &'static str,
    model: &'static str,
}

#[async_trait]
impl SpeechSynthesizer for SpeechClient {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Bytes, SpeechError> {
        let body = SpeechRequest {
            input: text,
            voice: voice.as_str(),
            response_format: "wav",
            model: "tts-1",
        };

        tracing::debug!(voice = voice.as_str(), chars = text.len(), "Requesting speech synthesis");

        let resp = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SpeechError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let audio = resp.bytes().await?;
        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        Ok(audio)
    }
}
