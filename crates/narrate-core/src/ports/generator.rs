//! Speech generation port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Clip;

/// What to say and how.
///
/// Built by the engine from the current settings snapshot, so a settings
/// change only affects requests issued after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    /// Text of one segment.
    pub text: String,
    /// Backend-specific voice identifier (e.g. `"alloy"`).
    pub voice_id: String,
    /// Pitch multiplier. Backends that cannot shift pitch ignore it.
    pub pitch: f32,
}

impl SynthesisRequest {
    #[must_use]
    pub fn new(text: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            pitch: 1.0,
        }
    }

    #[must_use]
    pub const fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }
}

/// Errors returned by [`AudioGenerator::generate`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The backend rejected or failed the request.
    #[error("Speech backend failed: {0}")]
    Backend(String),

    /// Transport failure talking to a remote backend.
    #[error("Speech request failed: {0}")]
    Http(String),

    /// The backend returned audio that could not be decoded.
    #[error("Could not decode generated audio: {0}")]
    Decode(String),

    /// The backend is not ready (model missing, endpoint not configured).
    #[error("Speech backend unavailable: {0}")]
    Unavailable(String),
}

/// Backend-agnostic speech generator.
///
/// The engine calls [`generate`](AudioGenerator::generate) serially: a new
/// call is never issued while another one is still being polled. A call the
/// engine no longer needs is dropped rather than awaited, so implementations
/// must tolerate their future being dropped at any `.await` point.
///
/// Timeouts are the implementation's responsibility; the engine imposes none.
#[async_trait]
pub trait AudioGenerator: Send + Sync {
    /// Generate audio for one segment.
    async fn generate(&self, request: &SynthesisRequest) -> Result<Clip, GenerationError>;

    /// Short stable identifier used in logs and fallback notices.
    fn name(&self) -> &'static str;

    /// Drop any warmed-up backend state (clients, model handles) so the next
    /// call starts fresh.
    fn reset(&self) {}
}
