//! Streaming text-to-speech
//!
//! Wraps the ElevenLabs streaming synthesis API. Audio chunks are yielded
//! as the provider produces them; first-chunk latency matters, so the reply
//! is never buffered whole.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::config::TtsConfig;
use crate::{Error, Result};

/// A finite, single-pass stream of synthesized audio chunks
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Synthesizes speech from text
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize `text`, yielding audio chunks as they are produced
    ///
    /// # Errors
    ///
    /// Returns `Upstream` if the provider rejects the request; the caller is
    /// expected to surface a distinct synthesis-failed signal rather than
    /// ending silently.
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;
}

/// ElevenLabs streaming synthesis client
pub struct ElevenLabsTts {
    client: reqwest::Client,
    config: TtsConfig,
}

impl ElevenLabsTts {
    /// Create a new ElevenLabs client
    #[must_use]
    pub fn new(config: TtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}/stream",
            self.config.voice_id
        );

        let request = SynthesisRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[(
                "optimize_streaming_latency",
                self.config.optimize_streaming_latency,
            )])
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("ElevenLabs request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "ElevenLabs API error {status}: {body}"
            )));
        }

        tracing::debug!(chars = text.len(), "synthesis stream started");

        let chunks = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| Error::Upstream(format!("synthesis stream interrupted: {e}")))
        });

        Ok(Box::pin(chunks))
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_request_serializes() {
        let request = SynthesisRequest {
            text: "Hello there",
            model_id: "eleven_turbo_v2",
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"text\":\"Hello there\""));
        assert!(json.contains("\"model_id\":\"eleven_turbo_v2\""));
        assert!(json.contains("\"stability\":0.5"));
        assert!(json.contains("\"similarity_boost\":0.75"));
    }
}
