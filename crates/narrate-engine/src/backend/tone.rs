//! Offline placeholder generator.
//!
//! Produces a soft sine tone whose length grows with the word count, so the
//! engine can run (and be tested) without a speech backend. Used as the
//! default secondary provider.

use std::f32::consts::TAU;
use std::time::Duration;

use async_trait::async_trait;
use narrate_core::{AudioGenerator, Clip, GenerationError, SynthesisRequest};

const SAMPLE_RATE: u32 = 16_000;
const BASE_FREQUENCY_HZ: f32 = 220.0;
const AMPLITUDE: f32 = 0.08;
const FADE: Duration = Duration::from_millis(10);

/// Tone generator with a fixed per-word duration.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    per_word: Duration,
    latency: Duration,
}

impl Default for ToneGenerator {
    fn default() -> Self {
        Self {
            per_word: Duration::from_millis(300),
            latency: Duration::ZERO,
        }
    }
}

impl ToneGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_word_duration(mut self, per_word: Duration) -> Self {
        self.per_word = per_word;
        self
    }

    /// Simulated synthesis time before each clip is returned.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn render(&self, words: usize, pitch: f32) -> Clip {
        let words = u32::try_from(words.max(1)).unwrap_or(u32::MAX);
        let duration = self.per_word.saturating_mul(words);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let len = (duration.as_secs_f64() * f64::from(SAMPLE_RATE)).round() as usize;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let fade_len = ((FADE.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize).min(len / 2);

        let pitch = if pitch.is_finite() && pitch > 0.0 { pitch } else { 1.0 };
        #[allow(clippy::cast_precision_loss)]
        let step = TAU * BASE_FREQUENCY_HZ * pitch / SAMPLE_RATE as f32;

        #[allow(clippy::cast_precision_loss)]
        let samples = (0..len)
            .map(|i| {
                let edge = i.min(len - 1 - i);
                let envelope = if edge < fade_len {
                    edge as f32 / fade_len as f32
                } else {
                    1.0
                };
                (i as f32 * step).sin() * AMPLITUDE * envelope
            })
            .collect();

        Clip::from_samples(samples, SAMPLE_RATE)
    }
}

#[async_trait]
impl AudioGenerator for ToneGenerator {
    async fn generate(&self, request: &SynthesisRequest) -> Result<Clip, GenerationError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let words = request.text.split_whitespace().count();
        Ok(self.render(words, request.pitch))
    }

    fn name(&self) -> &'static str {
        "tone"
    }
}
