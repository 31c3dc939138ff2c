//! Audio output port.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::domain::Clip;

/// Callback fired when a clip finishes playing naturally.
pub type EndCallback = Box<dyn FnOnce() + Send + 'static>;

/// Callback fired when the sink fails while a clip is playing.
pub type ErrorCallback = Box<dyn FnOnce(SinkError) + Send + 'static>;

/// Errors reported by an [`AudioSink`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The output device or stream failed.
    #[error("Audio output failed: {0}")]
    Output(String),

    /// The sink does not implement this operation.
    #[error("Audio sink does not support {0}")]
    Unsupported(&'static str),

    /// The sink's worker thread is gone.
    #[error("Audio thread died unexpectedly")]
    ThreadDied,
}

/// What a sink can do, reported once when the engine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkCapabilities {
    /// `pause()`/`resume()` really hold and continue a sounding clip.
    ///
    /// When `false` the engine emulates pause by stopping the clip and
    /// replaying it later from the elapsed offset.
    pub native_pause: bool,
}

/// Parameters for one [`AudioSink::play`] call.
pub struct PlayOptions {
    /// Playback rate multiplier (1.0 = normal).
    pub rate: f32,

    /// Offset into the clip to start from.
    pub offset: Duration,

    /// Fired at most once, when the clip drains. Never fired if the clip is
    /// superseded by [`AudioSink::stop`] or another `play()`.
    pub on_end: EndCallback,

    /// Fired at most once if playback fails after `play()` returned `Ok`.
    pub on_error: ErrorCallback,
}

impl PlayOptions {
    #[must_use]
    pub fn new(rate: f32, on_end: EndCallback, on_error: ErrorCallback) -> Self {
        Self {
            rate,
            offset: Duration::ZERO,
            on_end,
            on_error,
        }
    }

    #[must_use]
    pub const fn starting_at(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }
}

impl fmt::Debug for PlayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayOptions")
            .field("rate", &self.rate)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// Abstraction over an audio output that plays one clip at a time.
///
/// # Object safety
/// All methods take `&self`; implementations use interior mutability
/// (channels, atomics) for their state.
pub trait AudioSink: Send + Sync {
    /// Short stable identifier used in logs and fallback notices.
    fn name(&self) -> &'static str;

    /// What this sink supports.
    fn capabilities(&self) -> SinkCapabilities;

    /// Start playing `clip`, replacing anything currently sounding.
    fn play(&self, clip: Arc<Clip>, options: PlayOptions) -> Result<(), SinkError>;

    /// Stop playback immediately. Pending `on_end` callbacks never fire.
    fn stop(&self);

    /// Hold the sounding clip.
    fn pause(&self) -> Result<(), SinkError> {
        Err(SinkError::Unsupported("pause"))
    }

    /// Continue a clip held by [`pause`](AudioSink::pause).
    fn resume(&self) -> Result<(), SinkError> {
        Err(SinkError::Unsupported("resume"))
    }
}
