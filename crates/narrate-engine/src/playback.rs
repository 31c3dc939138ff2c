//! Clip playback through `rodio`.
//!
//! [`ClipPlayer`] owns the output stream and lives on the audio thread
//! (see [`crate::audio_thread`]). Each `play` gets a fresh `rodio::Sink` and
//! a watcher thread that fires `on_end` once the sink drains, unless the
//! clip was stopped or replaced first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use narrate_core::{Clip, PlayOptions, SinkError};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

/// Sink for the clip currently playing, plus its "still wanted" flag.
struct Current {
    sink: Arc<Sink>,
    live: Arc<AtomicBool>,
}

/// Plays one clip at a time on the default output device.
pub struct ClipPlayer {
    /// rodio output stream (must be kept alive).
    _stream: OutputStream,

    /// Handle used to create sinks.
    stream_handle: OutputStreamHandle,

    current: Option<Current>,
}

impl ClipPlayer {
    /// Open the default output device.
    pub fn new() -> Result<Self, SinkError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| SinkError::Output(e.to_string()))?;

        tracing::info!("Audio playback initialized on default output device");

        Ok(Self {
            _stream: stream,
            stream_handle,
            current: None,
        })
    }

    /// Play `clip` from `options.offset` at `options.rate`, replacing any
    /// clip already playing.
    pub fn play(&mut self, clip: &Clip, options: PlayOptions) -> Result<(), SinkError> {
        self.stop();

        let PlayOptions {
            rate,
            offset,
            on_end,
            on_error: _,
        } = options;

        let sink = Sink::try_new(&self.stream_handle).map_err(|e| SinkError::Output(e.to_string()))?;
        sink.set_speed(rate.max(0.1));

        let source = rodio::buffer::SamplesBuffer::new(1, clip.sample_rate(), clip.samples().to_vec());
        if offset.is_zero() {
            sink.append(source);
        } else {
            sink.append(source.skip_duration(offset));
        }

        let sink = Arc::new(sink);
        let live = Arc::new(AtomicBool::new(true));

        let watched = Arc::clone(&sink);
        let still_live = Arc::clone(&live);
        std::thread::Builder::new()
            .name("narrate-playback-watch".into())
            .spawn(move || {
                // Returns when the queue drains or the sink is stopped.
                watched.sleep_until_end();
                if still_live.swap(false, Ordering::SeqCst) {
                    tracing::debug!("Clip finished");
                    on_end();
                }
            })
            .map_err(|e| {
                sink.stop();
                SinkError::Output(format!("failed to spawn playback watcher: {e}"))
            })?;

        tracing::debug!(
            sample_rate = clip.sample_rate(),
            duration_ms = clip.duration().as_millis(),
            offset_ms = offset.as_millis(),
            rate,
            "Clip playback started"
        );

        self.current = Some(Current { sink, live });
        Ok(())
    }

    /// Stop the current clip. Its `on_end` never fires.
    pub fn stop(&mut self) {
        if let Some(current) = self.current.take() {
            current.live.store(false, Ordering::SeqCst);
            current.sink.stop();
            tracing::debug!("Clip playback stopped");
        }
    }

    pub fn pause(&self) {
        if let Some(current) = &self.current {
            current.sink.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(current) = &self.current {
            current.sink.play();
        }
    }
}

impl Drop for ClipPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
