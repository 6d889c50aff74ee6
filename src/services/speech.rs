//! Text-to-speech via ElevenLabs
//!
//! Turns a taunt line into audio, returned base64-encoded so the JSON API
//! can carry it. A thin wrapper: one POST, no retries.

use base64::Engine;
use std::time::Duration;
use tracing::warn;

use crate::types::{AppError, Result};

const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// ElevenLabs TTS client
pub struct SpeechService {
    client: reqwest::Client,
    api_key: Option<String>,
    voice_id: String,
}

impl SpeechService {
    pub fn new(api_key: Option<String>, voice_id: String, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            voice_id,
        }
    }

    /// Whether a key is configured at all
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Synthesize a line; returns base64 MP3 audio
    pub async fn synthesize(&self, text: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Upstream("ELEVENLABS_API_KEY not configured".into()))?;

        let url = format!("{}/{}", ELEVENLABS_TTS_URL, self.voice_id);
        let body = serde_json::json!({
            "text": text,
            "model_id": "eleven_multilingual_v2",
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("ElevenLabs request failed: {e}")))?;

        if !response.status().is_success() {
            warn!("ElevenLabs returned {}", response.status());
            return Err(AppError::Upstream(format!(
                "ElevenLabs returned {}",
                response.status()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("ElevenLabs body read failed: {e}")))?;

        Ok(base64::engine::general_purpose::STANDARD.encode(&audio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_key_is_upstream_error() {
        let service = SpeechService::new(None, "voice".into(), 1000);
        assert!(!service.is_configured());

        let err = service.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
