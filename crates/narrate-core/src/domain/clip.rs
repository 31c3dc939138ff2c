//! Generated audio for a single segment.

use std::sync::Arc;
use std::time::Duration;

/// Audio produced for one segment.
///
/// A clip is immutable once built. The sample buffer sits behind an `Arc`
/// so the cache can hand a clip to a sink without copying it, but no holder
/// can mutate it.
#[derive(Debug, Clone)]
pub struct Clip {
    /// Mono PCM f32 samples.
    samples: Arc<[f32]>,

    /// Sample rate in Hz.
    sample_rate: u32,

    /// Playback duration at 1.0x.
    duration: Duration,

    /// Wall-clock time the generator spent producing this clip.
    generation_time: Duration,
}

impl Clip {
    /// Build a clip from mono samples. The duration is derived from the
    /// sample count.
    #[must_use]
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = if sample_rate == 0 {
            Duration::ZERO
        } else {
            #[allow(clippy::cast_precision_loss)]
            Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate))
        };

        Self {
            samples: samples.into(),
            sample_rate,
            duration,
            generation_time: Duration::ZERO,
        }
    }

    /// Build a silent clip of the given length.
    #[must_use]
    pub fn silence(duration: Duration, sample_rate: u32) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let len = (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize;
        Self::from_samples(vec![0.0; len], sample_rate)
    }

    /// Stamp the time the generator took. Called by the engine once the
    /// generation call returns.
    #[must_use]
    pub const fn with_generation_time(mut self, elapsed: Duration) -> Self {
        self.generation_time = elapsed;
        self
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub const fn generation_time(&self) -> Duration {
        self.generation_time
    }

    /// Whether the clip contains no audio at all.
    ///
    /// Empty clips are still valid generation results; the sink simply
    /// finishes them immediately.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
