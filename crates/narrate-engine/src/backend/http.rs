//! OpenAI-compatible speech endpoint.
//!
//! Posts `{model, input, voice, response_format: "wav"}` to
//! `<endpoint>/v1/audio/speech` and decodes the WAV reply to mono `f32`.
//! Works against hosted APIs and local servers that mimic them.
//!
//! The HTTP client is built on first use and kept in the generator itself;
//! [`AudioGenerator::reset`] drops it so the next request reconnects.

use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use narrate_core::{AudioGenerator, Clip, GenerationError, SynthesisRequest};
use rodio::{Decoder, Source};
use serde_json::json;

/// Connection settings for an OpenAI-compatible speech endpoint.
#[derive(Debug, Clone)]
pub struct HttpSpeechConfig {
    /// Base URL, e.g. `https://api.openai.com` or `http://localhost:8880`.
    pub endpoint: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub model: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpSpeechConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model: "tts-1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn speech_url(&self) -> String {
        format!("{}/v1/audio/speech", self.endpoint.trim_end_matches('/'))
    }
}

/// Speech generator backed by an HTTP endpoint.
pub struct HttpSpeechGenerator {
    config: HttpSpeechConfig,
    client: Mutex<Option<reqwest::Client>>,
}

impl HttpSpeechGenerator {
    pub fn new(config: HttpSpeechConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    /// Shared client, built on first use.
    fn client(&self) -> Result<reqwest::Client, GenerationError> {
        let mut slot = self
            .client
            .lock()
            .map_err(|_| GenerationError::Unavailable("HTTP client lock poisoned".into()))?;

        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        tracing::debug!(endpoint = %self.config.endpoint, "Speech HTTP client created");
        *slot = Some(client.clone());
        Ok(client)
    }

    fn request_body(&self, request: &SynthesisRequest) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "input": request.text,
            "voice": request.voice_id,
            "response_format": "wav",
        })
    }
}

#[async_trait]
impl AudioGenerator for HttpSpeechGenerator {
    async fn generate(&self, request: &SynthesisRequest) -> Result<Clip, GenerationError> {
        if self.config.endpoint.trim().is_empty() {
            return Err(GenerationError::Unavailable("no speech endpoint configured".into()));
        }

        let client = self.client()?;
        let mut builder = client
            .post(self.config.speech_url())
            .header("Content-Type", "application/json")
            .json(&self.request_body(request));
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!("HTTP {status}: {}", body.trim())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let clip = decode_wav(bytes.to_vec())?;
        tracing::debug!(
            chars = request.text.len(),
            duration_ms = clip.duration().as_millis(),
            "Speech received"
        );
        Ok(clip)
    }

    fn name(&self) -> &'static str {
        "http"
    }

    fn reset(&self) {
        if let Ok(mut slot) = self.client.lock() {
            if slot.take().is_some() {
                tracing::debug!("Speech HTTP client dropped");
            }
        }
    }
}

/// Decode a WAV file to a mono clip, averaging channels.
pub fn decode_wav(bytes: Vec<u8>) -> Result<Clip, GenerationError> {
    let decoder = Decoder::new_wav(Cursor::new(bytes)).map_err(|e| GenerationError::Decode(e.to_string()))?;
    let channels = usize::from(decoder.channels().max(1));
    let sample_rate = decoder.sample_rate();
    let interleaved: Vec<f32> = decoder.convert_samples::<f32>().collect();

    let samples = if channels == 1 {
        interleaved
    } else {
        #[allow(clippy::cast_precision_loss)]
        let scale = 1.0 / channels as f32;
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    };

    Ok(Clip::from_samples(samples, sample_rate))
}
