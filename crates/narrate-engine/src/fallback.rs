//! Provider fallback decorator.
//!
//! [`FallbackProvider`] wraps a primary generator/sink pair and a secondary
//! one, and implements both [`AudioGenerator`] and [`AudioSink`] itself. The
//! first primary failure (a rejected generation, a `play` error or an
//! asynchronous `on_error` signal) switches every later call to the
//! secondary until [`FallbackProvider::reset_to_primary`]. The failed
//! operation is replayed on the secondary before control returns to the
//! caller, and a listener is told which error caused the switch. Secondary
//! failures are returned as-is. An error from a clip that was since stopped
//! or replaced still switches providers but is not replayed.
//!
//! Pause and resume failures also switch providers but are reported back,
//! since there is nothing sounding on the secondary to pause. The
//! controller's stop-and-replay path then lands on the secondary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use narrate_core::{
    AudioGenerator, AudioSink, Clip, EndCallback, ErrorCallback, FallbackNotice, GenerationError,
    PlayOptions, SinkCapabilities, SinkError, SynthesisRequest,
};

/// Called once per switch to the secondary provider.
pub type FallbackListener = Arc<dyn Fn(FallbackNotice) + Send + Sync>;

/// A generator and the sink that plays its output.
#[derive(Clone)]
pub struct ProviderPair {
    pub generator: Arc<dyn AudioGenerator>,
    pub sink: Arc<dyn AudioSink>,
}

impl ProviderPair {
    pub fn new(generator: Arc<dyn AudioGenerator>, sink: Arc<dyn AudioSink>) -> Self {
        Self { generator, sink }
    }

    /// `"generator/sink"`, used in notices.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.generator.name(), self.sink.name())
    }
}

struct Shared {
    primary: ProviderPair,
    secondary: ProviderPair,
    on_secondary: AtomicBool,
    /// Bumped by every `play` and `stop`; older clips are superseded.
    playback: AtomicU64,
    listener: Mutex<Option<FallbackListener>>,
}

impl Shared {
    fn active(&self) -> &ProviderPair {
        if self.on_secondary.load(Ordering::SeqCst) {
            &self.secondary
        } else {
            &self.primary
        }
    }

    /// Switch to the secondary. Only the first caller notifies.
    fn switch(&self, operation: &str, error: &str) {
        if self.on_secondary.swap(true, Ordering::SeqCst) {
            return;
        }

        let provider = self.secondary.label();
        tracing::warn!(
            operation,
            error,
            primary = %self.primary.label(),
            secondary = %provider,
            "Primary speech provider failed, switching to secondary"
        );

        let listener = self
            .listener
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(Arc::clone));
        if let Some(listener) = listener {
            listener(FallbackNotice {
                operation: operation.to_string(),
                error: error.to_string(),
                provider,
            });
        }
    }

    /// Primary sink signalled an error for a clip already handed to it.
    fn on_primary_play_error(
        &self,
        error: &SinkError,
        playback: u64,
        clip: Arc<Clip>,
        rate: f32,
        offset: Duration,
        relay: &Relay,
    ) {
        self.switch("play", &error.to_string());
        if self.playback.load(Ordering::SeqCst) != playback {
            tracing::debug!(error = %error, "Late error from a superseded clip, not replaying");
            return;
        }
        if let Err(e) = self.secondary.sink.play(clip, relay.options(rate, offset)) {
            tracing::warn!(error = %e, "Secondary sink failed");
            relay.error(e);
        }
    }
}

/// Caller callbacks shared between the primary and secondary attempts so
/// whichever fires first consumes them.
#[derive(Clone)]
struct Relay(Arc<Mutex<Option<(EndCallback, ErrorCallback)>>>);

impl Relay {
    fn new(on_end: EndCallback, on_error: ErrorCallback) -> Self {
        Self(Arc::new(Mutex::new(Some((on_end, on_error)))))
    }

    fn take(&self) -> Option<(EndCallback, ErrorCallback)> {
        self.0.lock().ok().and_then(|mut guard| guard.take())
    }

    fn end(&self) {
        if let Some((on_end, _)) = self.take() {
            on_end();
        }
    }

    fn error(&self, error: SinkError) {
        if let Some((_, on_error)) = self.take() {
            on_error(error);
        }
    }

    fn options(&self, rate: f32, offset: Duration) -> PlayOptions {
        let end = self.clone();
        let error = self.clone();
        PlayOptions::new(
            rate,
            Box::new(move || end.end()),
            Box::new(move |e| error.error(e)),
        )
        .starting_at(offset)
    }
}

/// Generator and sink that fall back to a secondary provider.
///
/// Cheap to clone; clones share the switch state.
#[derive(Clone)]
pub struct FallbackProvider {
    shared: Arc<Shared>,
}

impl FallbackProvider {
    pub fn new(primary: ProviderPair, secondary: ProviderPair) -> Self {
        Self {
            shared: Arc::new(Shared {
                primary,
                secondary,
                on_secondary: AtomicBool::new(false),
                playback: AtomicU64::new(0),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Register the listener told about a switch.
    #[must_use]
    pub fn with_listener(self, listener: impl Fn(FallbackNotice) + Send + Sync + 'static) -> Self {
        if let Ok(mut slot) = self.shared.listener.lock() {
            *slot = Some(Arc::new(listener));
        }
        self
    }

    #[must_use]
    pub fn is_using_secondary(&self) -> bool {
        self.shared.on_secondary.load(Ordering::SeqCst)
    }

    /// Go back to the primary provider, resetting both generators.
    pub fn reset_to_primary(&self) {
        tracing::info!(primary = %self.shared.primary.label(), "Resetting to primary speech provider");
        self.shared.on_secondary.store(false, Ordering::SeqCst);
        self.shared.primary.generator.reset();
        self.shared.secondary.generator.reset();
    }
}

#[async_trait]
impl AudioGenerator for FallbackProvider {
    async fn generate(&self, request: &SynthesisRequest) -> Result<Clip, GenerationError> {
        if !self.is_using_secondary() {
            match self.shared.primary.generator.generate(request).await {
                Ok(clip) => return Ok(clip),
                Err(e) => self.shared.switch("generate", &e.to_string()),
            }
        }
        self.shared.secondary.generator.generate(request).await
    }

    fn name(&self) -> &'static str {
        self.shared.active().generator.name()
    }

    fn reset(&self) {
        self.reset_to_primary();
    }
}

impl AudioSink for FallbackProvider {
    fn name(&self) -> &'static str {
        self.shared.active().sink.name()
    }

    fn capabilities(&self) -> SinkCapabilities {
        self.shared.active().sink.capabilities()
    }

    fn play(&self, clip: Arc<Clip>, options: PlayOptions) -> Result<(), SinkError> {
        let PlayOptions {
            rate,
            offset,
            on_end,
            on_error,
        } = options;
        let relay = Relay::new(on_end, on_error);
        let playback = self.shared.playback.fetch_add(1, Ordering::SeqCst) + 1;

        if self.is_using_secondary() {
            return self
                .shared
                .secondary
                .sink
                .play(clip, relay.options(rate, offset));
        }

        let shared = Arc::clone(&self.shared);
        let replay_clip = Arc::clone(&clip);
        let end_relay = relay.clone();
        let error_relay = relay.clone();
        let primary_options = PlayOptions::new(
            rate,
            Box::new(move || end_relay.end()),
            Box::new(move |e| {
                shared.on_primary_play_error(
                    &e,
                    playback,
                    replay_clip,
                    rate,
                    offset,
                    &error_relay,
                );
            }),
        )
        .starting_at(offset);

        match self.shared.primary.sink.play(Arc::clone(&clip), primary_options) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.switch("play", &e.to_string());
                self.shared
                    .secondary
                    .sink
                    .play(clip, relay.options(rate, offset))
            }
        }
    }

    fn stop(&self) {
        self.shared.playback.fetch_add(1, Ordering::SeqCst);
        self.shared.primary.sink.stop();
        self.shared.secondary.sink.stop();
    }

    fn pause(&self) -> Result<(), SinkError> {
        let on_secondary = self.is_using_secondary();
        match self.shared.active().sink.pause() {
            Err(e) if !on_secondary && !matches!(e, SinkError::Unsupported(_)) => {
                self.shared.switch("pause", &e.to_string());
                Err(e)
            }
            other => other,
        }
    }

    fn resume(&self) -> Result<(), SinkError> {
        let on_secondary = self.is_using_secondary();
        match self.shared.active().sink.resume() {
            Err(e) if !on_secondary && !matches!(e, SinkError::Unsupported(_)) => {
                self.shared.switch("resume", &e.to_string());
                Err(e)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct FailingSink;

    impl AudioSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn capabilities(&self) -> SinkCapabilities {
            SinkCapabilities { native_pause: true }
        }

        fn play(&self, _clip: Arc<Clip>, options: PlayOptions) -> Result<(), SinkError> {
            // Accepts the clip, then reports an error asynchronously.
            (options.on_error)(SinkError::Output("device unplugged".into()));
            Ok(())
        }

        fn stop(&self) {}
    }

    /// Accepts the clip and keeps its error callback for the test to fire.
    #[derive(Default)]
    struct LateFailingSink {
        on_error: Mutex<Option<ErrorCallback>>,
    }

    impl LateFailingSink {
        fn fail(&self) {
            let callback = self.on_error.lock().unwrap().take();
            if let Some(callback) = callback {
                callback(SinkError::Output("device unplugged".into()));
            }
        }
    }

    impl AudioSink for LateFailingSink {
        fn name(&self) -> &'static str {
            "late"
        }

        fn capabilities(&self) -> SinkCapabilities {
            SinkCapabilities::default()
        }

        fn play(&self, _clip: Arc<Clip>, options: PlayOptions) -> Result<(), SinkError> {
            *self.on_error.lock().unwrap() = Some(options.on_error);
            Ok(())
        }

        fn stop(&self) {}
    }

    #[derive(Default)]
    struct CountingSink {
        plays: AtomicUsize,
    }

    impl AudioSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn capabilities(&self) -> SinkCapabilities {
            SinkCapabilities::default()
        }

        fn play(&self, _clip: Arc<Clip>, options: PlayOptions) -> Result<(), SinkError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            (options.on_end)();
            Ok(())
        }

        fn stop(&self) {}
    }

    struct NullGenerator;

    #[async_trait]
    impl AudioGenerator for NullGenerator {
        async fn generate(&self, _request: &SynthesisRequest) -> Result<Clip, GenerationError> {
            Ok(Clip::silence(Duration::from_millis(10), 100))
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    #[test]
    fn async_sink_error_replays_on_secondary() {
        let secondary_sink = Arc::new(CountingSink::default());
        let notices = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&notices);

        let provider = FallbackProvider::new(
            ProviderPair::new(Arc::new(NullGenerator), Arc::new(FailingSink)),
            ProviderPair::new(Arc::new(NullGenerator), secondary_sink.clone()),
        )
        .with_listener(move |notice| seen.lock().unwrap().push(notice));

        let ended = Arc::new(AtomicBool::new(false));
        let errored = Arc::new(AtomicBool::new(false));
        let (end_flag, error_flag) = (Arc::clone(&ended), Arc::clone(&errored));
        let options = PlayOptions::new(
            1.0,
            Box::new(move || end_flag.store(true, Ordering::SeqCst)),
            Box::new(move |_| error_flag.store(true, Ordering::SeqCst)),
        );

        provider
            .play(Arc::new(Clip::silence(Duration::from_millis(10), 100)), options)
            .unwrap();

        assert!(ended.load(Ordering::SeqCst));
        assert!(!errored.load(Ordering::SeqCst));
        assert_eq!(secondary_sink.plays.load(Ordering::SeqCst), 1);
        assert!(provider.is_using_secondary());
        assert_eq!(AudioSink::name(&provider), "counting");
        assert!(!provider.capabilities().native_pause);

        let notices = notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].operation, "play");
        assert_eq!(notices[0].provider, "null/counting");
    }

    #[test]
    fn error_after_stop_switches_without_replaying() {
        let primary_sink = Arc::new(LateFailingSink::default());
        let secondary_sink = Arc::new(CountingSink::default());
        let provider = FallbackProvider::new(
            ProviderPair::new(Arc::new(NullGenerator), primary_sink.clone()),
            ProviderPair::new(Arc::new(NullGenerator), secondary_sink.clone()),
        );

        let options = PlayOptions::new(1.0, Box::new(|| {}), Box::new(|_| {}));
        provider
            .play(Arc::new(Clip::silence(Duration::from_millis(10), 100)), options)
            .unwrap();
        provider.stop();
        primary_sink.fail();

        assert!(provider.is_using_secondary());
        assert_eq!(secondary_sink.plays.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn error_from_replaced_clip_is_not_replayed() {
        let primary_sink = Arc::new(LateFailingSink::default());
        let secondary_sink = Arc::new(CountingSink::default());
        let provider = FallbackProvider::new(
            ProviderPair::new(Arc::new(NullGenerator), primary_sink.clone()),
            ProviderPair::new(Arc::new(NullGenerator), secondary_sink.clone()),
        );
        let clip = || Arc::new(Clip::silence(Duration::from_millis(10), 100));
        let options = || PlayOptions::new(1.0, Box::new(|| {}), Box::new(|_| {}));

        provider.play(clip(), options()).unwrap();
        let stale = primary_sink.on_error.lock().unwrap().take();
        provider.play(clip(), options()).unwrap();

        if let Some(callback) = stale {
            callback(SinkError::Output("device unplugged".into()));
        }
        assert_eq!(secondary_sink.plays.load(Ordering::SeqCst), 0);

        // The current clip's error is still replayed.
        primary_sink.fail();
        assert_eq!(secondary_sink.plays.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsupported_pause_is_not_a_failure() {
        let provider = FallbackProvider::new(
            ProviderPair::new(Arc::new(NullGenerator), Arc::new(CountingSink::default())),
            ProviderPair::new(Arc::new(NullGenerator), Arc::new(CountingSink::default())),
        );

        assert_eq!(provider.pause(), Err(SinkError::Unsupported("pause")));
        assert!(!provider.is_using_secondary());
    }
}
