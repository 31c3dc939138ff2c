//! Integration tests for the `PlaybackController` state machine.
//!
//! These tests drive the controller through its transitions with fake
//! generator and sink implementations. Time is paused (`start_paused`), so
//! generation latency and clip lengths are exact and the tests run
//! instantly. No audio hardware or network access is required.
//!
//! # What is tested
//!
//! - Load resets to `(0, 0)` and idle
//! - First play: `loading → playing`, lookahead fills the budget, then idles
//! - Buffering when the next segment is not ready in time
//! - Emulated and native pause/resume
//! - Skips, end of content, stop
//! - Foreground and background generation failures
//! - Serial generator calls under rapid skipping
//! - Provider fallback through the shared event stream

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use narrate_core::{
    AudioGenerator, AudioSink, Clip, EndCallback, GenerationError, Granularity, NarrationEvent,
    NarrationSettings, PlayOptions, PlaybackPosition, PlaybackStatus, SettingsUpdate,
    SinkCapabilities, SinkError, SynthesisRequest,
};
use narrate_engine::{ControllerHandle, FallbackProvider, PlaybackController, ProviderPair};
use tokio::sync::mpsc;
use tokio::time::Instant;

// ── Fake generator ─────────────────────────────────────────────────

/// Returns silent clips after a fixed latency, failing on request.
struct FakeGenerator {
    clip: Duration,
    latency: Duration,
    failing: Mutex<Vec<String>>,
    fail_all: AtomicBool,
    calls: Mutex<Vec<String>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl FakeGenerator {
    fn new() -> Self {
        Self {
            clip: Duration::from_secs(1),
            latency: Duration::from_millis(10),
            failing: Mutex::new(Vec::new()),
            fail_all: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_clip(mut self, clip: Duration) -> Self {
        self.clip = clip;
        self
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn failing_on(self, text: &str) -> Self {
        self.failing.lock().unwrap().push(text.to_string());
        self
    }

    fn failing_always(self) -> Self {
        self.fail_all.store(true, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, text: &str) -> usize {
        self.calls().iter().filter(|t| *t == text).count()
    }
}

/// Decrements the running count even when the future is dropped.
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioGenerator for FakeGenerator {
    async fn generate(&self, request: &SynthesisRequest) -> Result<Clip, GenerationError> {
        self.calls.lock().unwrap().push(request.text.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(Arc::clone(&self.running));

        tokio::time::sleep(self.latency).await;

        let fails = self.fail_all.load(Ordering::SeqCst)
            || self.failing.lock().unwrap().contains(&request.text);
        if fails {
            return Err(GenerationError::Backend(format!("cannot say {:?}", request.text)));
        }
        Ok(Clip::silence(self.clip, 100))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

// ── Fake sink ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum SinkCall {
    Play {
        offset: Duration,
        rate: f32,
        at: Instant,
    },
    Stop,
    Pause,
    Resume,
}

struct Sounding {
    remaining: Duration,
    started: Instant,
    on_end: Arc<Mutex<Option<EndCallback>>>,
}

/// Finishes each clip after `(duration - offset) / rate` of (paused) time.
struct FakeSink {
    native_pause: bool,
    fail_play: bool,
    drain_on_pause: bool,
    ticket: Arc<AtomicU64>,
    sounding: Mutex<Option<Sounding>>,
    log: Mutex<Vec<SinkCall>>,
}

impl FakeSink {
    fn emulated() -> Self {
        Self {
            native_pause: false,
            fail_play: false,
            drain_on_pause: false,
            ticket: Arc::new(AtomicU64::new(0)),
            sounding: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        }
    }

    fn native() -> Self {
        Self {
            native_pause: true,
            ..Self::emulated()
        }
    }

    /// Native pause that arrives just as the clip drains.
    fn draining_on_pause() -> Self {
        Self {
            drain_on_pause: true,
            ..Self::native()
        }
    }

    fn broken() -> Self {
        Self {
            fail_play: true,
            ..Self::emulated()
        }
    }

    fn log(&self) -> Vec<SinkCall> {
        self.log.lock().unwrap().clone()
    }

    fn plays(&self) -> Vec<(Duration, f32, Instant)> {
        self.log()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Play { offset, rate, at } => Some((offset, rate, at)),
                _ => None,
            })
            .collect()
    }

    fn arm_timer(&self, after: Duration, on_end: Arc<Mutex<Option<EndCallback>>>) {
        let ticket = self.ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.ticket);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if current.load(Ordering::SeqCst) == ticket {
                let callback = on_end.lock().unwrap().take();
                if let Some(callback) = callback {
                    callback();
                }
            }
        });
    }
}

impl AudioSink for FakeSink {
    fn name(&self) -> &'static str {
        "fake-sink"
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            native_pause: self.native_pause,
        }
    }

    fn play(&self, clip: Arc<Clip>, options: PlayOptions) -> Result<(), SinkError> {
        self.log.lock().unwrap().push(SinkCall::Play {
            offset: options.offset,
            rate: options.rate,
            at: Instant::now(),
        });
        if self.fail_play {
            return Err(SinkError::Output("no output device".into()));
        }

        let remaining = clip
            .duration()
            .saturating_sub(options.offset)
            .div_f32(options.rate);
        let on_end = Arc::new(Mutex::new(Some(options.on_end)));
        *self.sounding.lock().unwrap() = Some(Sounding {
            remaining,
            started: Instant::now(),
            on_end: Arc::clone(&on_end),
        });
        self.arm_timer(remaining, on_end);
        Ok(())
    }

    fn stop(&self) {
        self.ticket.fetch_add(1, Ordering::SeqCst);
        *self.sounding.lock().unwrap() = None;
        self.log.lock().unwrap().push(SinkCall::Stop);
    }

    fn pause(&self) -> Result<(), SinkError> {
        if !self.native_pause {
            return Err(SinkError::Unsupported("pause"));
        }
        if self.drain_on_pause {
            let sounding = self.sounding.lock().unwrap().take();
            let callback = sounding.and_then(|sounding| sounding.on_end.lock().unwrap().take());
            if let Some(callback) = callback {
                callback();
            }
        }
        self.ticket.fetch_add(1, Ordering::SeqCst);
        if let Some(sounding) = self.sounding.lock().unwrap().as_mut() {
            sounding.remaining = sounding.remaining.saturating_sub(sounding.started.elapsed());
        }
        self.log.lock().unwrap().push(SinkCall::Pause);
        Ok(())
    }

    fn resume(&self) -> Result<(), SinkError> {
        if !self.native_pause {
            return Err(SinkError::Unsupported("resume"));
        }
        let resumed = self.sounding.lock().unwrap().as_mut().map(|sounding| {
            sounding.started = Instant::now();
            (sounding.remaining, Arc::clone(&sounding.on_end))
        });
        if let Some((remaining, on_end)) = resumed {
            self.arm_timer(remaining, on_end);
        }
        self.log.lock().unwrap().push(SinkCall::Resume);
        Ok(())
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    handle: ControllerHandle,
    events: mpsc::UnboundedReceiver<NarrationEvent>,
    seen: Vec<NarrationEvent>,
    generator: Arc<FakeGenerator>,
    sink: Arc<FakeSink>,
}

impl Harness {
    async fn start(
        paragraphs: &[&str],
        generator: FakeGenerator,
        sink: FakeSink,
        settings: NarrationSettings,
    ) -> Self {
        let generator = Arc::new(generator);
        let sink = Arc::new(sink);
        let (handle, events) = PlaybackController::spawn(generator.clone(), sink.clone(), settings);
        handle
            .load(paragraphs.iter().map(ToString::to_string).collect())
            .await
            .unwrap();

        let mut harness = Self {
            handle,
            events,
            seen: Vec::new(),
            generator,
            sink,
        };
        harness.drain();
        harness.seen.clear();
        harness
    }

    async fn simple(paragraphs: &[&str]) -> Self {
        Self::start(
            paragraphs,
            FakeGenerator::new(),
            FakeSink::emulated(),
            NarrationSettings::default(),
        )
        .await
    }

    /// Move all queued events into `seen`.
    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.seen.push(event);
        }
    }

    /// Wait (in paused time) until an event matching `pred` arrives.
    async fn until(&mut self, pred: impl Fn(&NarrationEvent) -> bool) {
        let wait = async {
            while let Some(event) = self.events.recv().await {
                let done = pred(&event);
                self.seen.push(event);
                if done {
                    return;
                }
            }
            panic!("event stream closed");
        };
        tokio::time::timeout(Duration::from_secs(120), wait)
            .await
            .expect("timed out waiting for event");
    }

    async fn until_status(&mut self, status: PlaybackStatus) {
        self.until(|e| *e == NarrationEvent::StatusChanged { status })
            .await;
    }

    async fn settle(&mut self, time: Duration) {
        tokio::time::sleep(time).await;
        self.drain();
    }

    fn states(&self) -> Vec<PlaybackStatus> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                NarrationEvent::StatusChanged { status } => Some(*status),
                _ => None,
            })
            .collect()
    }

    fn positions(&self) -> Vec<PlaybackPosition> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                NarrationEvent::PositionChanged(update) => Some(update.position()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&NarrationEvent) -> bool) -> usize {
        self.seen.iter().filter(|e| pred(e)).count()
    }
}

fn is_end(event: &NarrationEvent) -> bool {
    matches!(event, NarrationEvent::EndOfContent)
}

fn is_error(event: &NarrationEvent) -> bool {
    matches!(event, NarrationEvent::Error { .. })
}

fn approx(actual: Duration, expected: Duration) -> bool {
    actual.abs_diff(expected) <= Duration::from_millis(5)
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn load_resets_to_start_and_idle() {
    let mut h = Harness::simple(&["A. B.", "C."]).await;
    h.handle.play().await.unwrap();
    h.until_status(PlaybackStatus::Playing).await;
    h.settle(Duration::from_millis(1_500)).await;

    h.handle.load_text("Fresh text.\n\nMore.").await.unwrap();

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.position, PlaybackPosition::START);
    assert_eq!(snapshot.status, PlaybackStatus::Idle);
    assert_eq!(snapshot.paragraph_count, 2);
    h.drain();
    assert_eq!(h.states().last(), Some(&PlaybackStatus::Idle));
    assert_eq!(h.positions().last(), Some(&PlaybackPosition::START));
}

#[tokio::test(start_paused = true)]
async fn first_play_loads_then_lookahead_fills_and_idles() {
    let mut h = Harness::simple(&["A. B.", "C."]).await;

    h.handle.play().await.unwrap();
    h.settle(Duration::from_millis(200)).await;

    assert_eq!(h.states(), vec![PlaybackStatus::Loading, PlaybackStatus::Playing]);
    assert_eq!(h.generator.calls(), vec!["A.", "B.", "C."]);

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.position, PlaybackPosition::START);
    assert!((snapshot.buffered_secs - 2.0).abs() < 1e-6);
    assert!(!snapshot.generating);
    assert!(!snapshot.lookahead_armed);
}

#[tokio::test(start_paused = true)]
async fn plays_through_and_ends_once() {
    let mut h = Harness::simple(&["A. B.", "C."]).await;

    h.handle.play().await.unwrap();
    h.until(is_end).await;
    h.settle(Duration::from_secs(5)).await;

    assert_eq!(
        h.states(),
        vec![PlaybackStatus::Loading, PlaybackStatus::Playing, PlaybackStatus::Idle]
    );
    let positions = h.positions();
    assert!(positions.contains(&PlaybackPosition::new(0, 1)));
    assert!(positions.contains(&PlaybackPosition::new(1, 0)));
    assert_eq!(positions.last(), Some(&PlaybackPosition::START));
    assert_eq!(h.count(is_end), 1);
    assert_eq!(h.sink.plays().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_generation_buffers_mid_stream() {
    let generator = FakeGenerator::new().with_latency(Duration::from_secs(2));
    let mut h = Harness::start(
        &["A. B."],
        generator,
        FakeSink::emulated(),
        NarrationSettings::default(),
    )
    .await;

    h.handle.play().await.unwrap();
    h.until(is_end).await;

    assert_eq!(
        h.states(),
        vec![
            PlaybackStatus::Loading,
            PlaybackStatus::Playing,
            PlaybackStatus::Buffering,
            PlaybackStatus::Playing,
            PlaybackStatus::Idle,
        ]
    );
    // The lookahead request for "B." was adopted, not issued twice.
    assert_eq!(h.generator.calls_for("B."), 1);
}

#[tokio::test(start_paused = true)]
async fn paragraph_granularity_speaks_whole_paragraphs() {
    let settings = NarrationSettings {
        granularity: Granularity::Paragraph,
        ..NarrationSettings::default()
    };
    let mut h = Harness::start(
        &["One. Two.", "Three. Four."],
        FakeGenerator::new(),
        FakeSink::emulated(),
        settings,
    )
    .await;

    h.handle.play().await.unwrap();
    h.until(is_end).await;
    h.settle(Duration::from_secs(5)).await;

    assert_eq!(h.generator.calls(), vec!["One. Two.", "Three. Four."]);
    assert_eq!(h.sink.plays().len(), 2);
    let positions = h.positions();
    assert!(positions.contains(&PlaybackPosition::new(1, 0)));
    assert!(!positions.contains(&PlaybackPosition::new(0, 1)));
    assert_eq!(h.count(is_end), 1);
    assert_eq!(
        h.states(),
        vec![PlaybackStatus::Loading, PlaybackStatus::Playing, PlaybackStatus::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn emulated_pause_replays_from_offset() {
    let mut h = Harness::simple(&["A."]).await;
    h.handle.play().await.unwrap();
    h.until_status(PlaybackStatus::Playing).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    h.handle.pause().await.unwrap();
    assert_eq!(h.sink.log().last(), Some(&SinkCall::Stop));

    tokio::time::sleep(Duration::from_secs(3)).await;
    h.handle.resume().await.unwrap();

    let plays = h.sink.plays();
    assert_eq!(plays.len(), 2);
    let (offset, rate, _) = plays[1];
    assert!(approx(offset, Duration::from_millis(400)), "offset {offset:?}");
    assert!((rate - 1.0).abs() < f32::EPSILON);

    // The replayed clip finishes after the remaining 0.6s.
    let resumed_at = Instant::now();
    h.until(is_end).await;
    assert!(approx(resumed_at.elapsed(), Duration::from_millis(600)));
    h.drain();
    assert_eq!(h.count(is_end), 1);
}

#[tokio::test(start_paused = true)]
async fn native_pause_uses_the_sink() {
    let mut h = Harness::start(
        &["A."],
        FakeGenerator::new(),
        FakeSink::native(),
        NarrationSettings::default(),
    )
    .await;
    h.handle.play().await.unwrap();
    h.until_status(PlaybackStatus::Playing).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    h.handle.pause().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.handle.play().await.unwrap();
    h.until(is_end).await;

    let log = h.sink.log();
    assert!(log.contains(&SinkCall::Pause));
    assert!(log.contains(&SinkCall::Resume));
    assert_eq!(h.sink.plays().len(), 1);
    assert_eq!(
        h.states(),
        vec![
            PlaybackStatus::Loading,
            PlaybackStatus::Playing,
            PlaybackStatus::Paused,
            PlaybackStatus::Playing,
            PlaybackStatus::Idle,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn clip_ending_during_native_pause_advances_on_resume() {
    let mut h = Harness::start(
        &["A. B."],
        FakeGenerator::new(),
        FakeSink::draining_on_pause(),
        NarrationSettings::default(),
    )
    .await;
    h.handle.play().await.unwrap();
    h.until_status(PlaybackStatus::Playing).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    h.handle.pause().await.unwrap();
    h.settle(Duration::from_secs(2)).await;
    assert_eq!(h.positions().last(), Some(&PlaybackPosition::START));

    h.handle.play().await.unwrap();
    h.until(is_end).await;

    assert!(h.positions().contains(&PlaybackPosition::new(0, 1)));
    assert_eq!(h.sink.plays().len(), 2);
    assert!(!h.sink.log().contains(&SinkCall::Resume));
    assert_eq!(
        h.states(),
        vec![
            PlaybackStatus::Loading,
            PlaybackStatus::Playing,
            PlaybackStatus::Paused,
            PlaybackStatus::Playing,
            PlaybackStatus::Idle,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn pause_while_loading_holds_the_clip() {
    let generator = FakeGenerator::new().with_latency(Duration::from_secs(1));
    let mut h = Harness::start(
        &["A."],
        generator,
        FakeSink::emulated(),
        NarrationSettings::default(),
    )
    .await;

    h.handle.play().await.unwrap();
    h.handle.pause().await.unwrap();
    h.settle(Duration::from_secs(2)).await;

    assert!(h.sink.plays().is_empty());
    assert_eq!(h.generator.calls(), vec!["A."]);
    assert_eq!(h.handle.snapshot().await.unwrap().status, PlaybackStatus::Paused);

    h.handle.play().await.unwrap();
    h.drain();
    let plays = h.sink.plays();
    assert_eq!(plays.len(), 1);
    assert_eq!(plays[0].0, Duration::ZERO);
    assert_eq!(
        h.states(),
        vec![PlaybackStatus::Loading, PlaybackStatus::Paused, PlaybackStatus::Playing]
    );
}

#[tokio::test(start_paused = true)]
async fn skip_forward_past_last_paragraph_ends_exactly_once() {
    let mut h = Harness::simple(&["A.", "B."]).await;
    h.handle.play().await.unwrap();
    h.until_status(PlaybackStatus::Playing).await;

    h.handle.skip_forward().await.unwrap();
    h.drain();
    assert_eq!(h.positions().last(), Some(&PlaybackPosition::new(1, 0)));

    h.handle.skip_forward().await.unwrap();
    h.settle(Duration::from_secs(5)).await;

    assert_eq!(h.count(is_end), 1);
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PlaybackStatus::Idle);
    assert_eq!(snapshot.position, PlaybackPosition::START);
}

#[tokio::test(start_paused = true)]
async fn skip_backward_clamps_to_first_paragraph() {
    let mut h = Harness::simple(&["A. B.", "C."]).await;
    h.handle.play().await.unwrap();
    h.until_status(PlaybackStatus::Playing).await;
    h.settle(Duration::from_millis(1_200)).await;
    assert_eq!(h.positions().last(), Some(&PlaybackPosition::new(0, 1)));

    h.handle.skip_backward().await.unwrap();
    h.drain();

    assert_eq!(h.positions().last(), Some(&PlaybackPosition::START));
    // (0, 0) is cached, so playback restarts without loading.
    assert_eq!(h.states().last(), Some(&PlaybackStatus::Playing));
    assert_eq!(h.generator.calls_for("A."), 1);
}

#[tokio::test(start_paused = true)]
async fn skips_are_ignored_while_idle() {
    let mut h = Harness::simple(&["A.", "B."]).await;

    h.handle.skip_forward().await.unwrap();
    h.handle.skip_backward().await.unwrap();
    h.settle(Duration::from_secs(1)).await;

    assert!(h.seen.is_empty());
    assert!(h.generator.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_rewinds_but_keeps_the_cache() {
    let mut h = Harness::simple(&["A.", "B."]).await;
    h.handle.play().await.unwrap();
    h.until_status(PlaybackStatus::Playing).await;
    h.settle(Duration::from_millis(1_500)).await;

    h.handle.stop().await.unwrap();
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PlaybackStatus::Idle);
    assert_eq!(snapshot.position, PlaybackPosition::START);

    h.drain();
    h.seen.clear();
    h.handle.play().await.unwrap();
    h.drain();

    assert_eq!(h.states(), vec![PlaybackStatus::Playing]);
    assert_eq!(h.generator.calls_for("A."), 1);
}

#[tokio::test(start_paused = true)]
async fn reload_reuses_unchanged_paragraphs() {
    let mut h = Harness::simple(&["A.", "B."]).await;
    h.handle.play().await.unwrap();
    h.settle(Duration::from_millis(200)).await;
    assert_eq!(h.generator.calls(), vec!["A.", "B."]);

    h.handle
        .load(vec!["A.".into(), "Changed.".into()])
        .await
        .unwrap();
    h.handle.play().await.unwrap();
    h.settle(Duration::from_millis(200)).await;

    assert_eq!(h.generator.calls(), vec!["A.", "B.", "Changed."]);
}

#[tokio::test(start_paused = true)]
async fn foreground_failure_goes_idle_with_error() {
    let generator = FakeGenerator::new().failing_on("A.");
    let mut h = Harness::start(
        &["A. B."],
        generator,
        FakeSink::emulated(),
        NarrationSettings::default(),
    )
    .await;

    h.handle.play().await.unwrap();
    h.until(is_error).await;
    h.settle(Duration::from_secs(2)).await;

    assert_eq!(h.states(), vec![PlaybackStatus::Loading, PlaybackStatus::Idle]);
    assert_eq!(h.count(is_error), 1);
    assert!(h.sink.plays().is_empty());
}

#[tokio::test(start_paused = true)]
async fn lookahead_failures_back_off_and_give_up_quietly() {
    let generator = FakeGenerator::new()
        .with_clip(Duration::from_secs(5))
        .failing_on("B.");
    let settings = NarrationSettings {
        error_backoff_ms: 100,
        max_lookahead_retries: Some(3),
        ..NarrationSettings::default()
    };
    let mut h = Harness::start(&["A. B."], generator, FakeSink::emulated(), settings).await;

    h.handle.play().await.unwrap();
    h.settle(Duration::from_secs(1)).await;

    assert_eq!(h.generator.calls_for("B."), 3);
    assert_eq!(h.count(is_error), 0);
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PlaybackStatus::Playing);
    assert_eq!(snapshot.consecutive_failures, 3);
    assert!(!snapshot.lookahead_armed);
}

#[tokio::test(start_paused = true)]
async fn sink_failure_goes_idle_with_error() {
    let mut h = Harness::start(
        &["A."],
        FakeGenerator::new(),
        FakeSink::broken(),
        NarrationSettings::default(),
    )
    .await;

    h.handle.play().await.unwrap();
    h.until(is_error).await;

    assert_eq!(h.states(), vec![PlaybackStatus::Loading, PlaybackStatus::Idle]);
}

#[tokio::test(start_paused = true)]
async fn generator_is_never_called_concurrently() {
    let generator = FakeGenerator::new().with_latency(Duration::from_millis(500));
    let mut h = Harness::start(
        &["A.", "B.", "C.", "D."],
        generator,
        FakeSink::emulated(),
        NarrationSettings::default(),
    )
    .await;

    h.handle.play().await.unwrap();
    h.handle.skip_forward().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.handle.skip_forward().await.unwrap();
    h.handle.skip_backward().await.unwrap();
    h.until(is_end).await;

    assert_eq!(h.generator.max_running.load(Ordering::SeqCst), 1);
    assert!(h.generator.calls().len() >= 3);
}

#[tokio::test(start_paused = true)]
async fn segment_gap_separates_clips() {
    let settings = NarrationSettings {
        segment_gap_ms: 500,
        ..NarrationSettings::default()
    };
    let mut h = Harness::start(&["A. B."], FakeGenerator::new(), FakeSink::emulated(), settings)
        .await;

    h.handle.play().await.unwrap();
    h.until(is_end).await;

    let plays = h.sink.plays();
    assert_eq!(plays.len(), 2);
    assert!(approx(plays[1].2 - plays[0].2, Duration::from_millis(1_500)));
}

#[tokio::test(start_paused = true)]
async fn rate_change_applies_to_next_segment() {
    let mut h = Harness::simple(&["A. B."]).await;
    h.handle.play().await.unwrap();
    h.until_status(PlaybackStatus::Playing).await;

    h.handle
        .update_settings(SettingsUpdate {
            rate: Some(1.5),
            ..SettingsUpdate::default()
        })
        .await
        .unwrap();
    h.until(is_end).await;

    let rates: Vec<f32> = h.sink.plays().iter().map(|(_, rate, _)| *rate).collect();
    assert_eq!(rates, vec![1.0, 1.5]);
}

#[tokio::test(start_paused = true)]
async fn seek_while_playing_restarts_there() {
    let mut h = Harness::simple(&["A.", "B.", "C."]).await;
    h.handle.play().await.unwrap();
    h.until_status(PlaybackStatus::Playing).await;

    h.handle.seek(2).await.unwrap();
    h.until(is_end).await;

    assert!(h.positions().contains(&PlaybackPosition::new(2, 0)));
    assert!(!h.positions().contains(&PlaybackPosition::new(1, 0)));
}

#[tokio::test(start_paused = true)]
async fn provider_fallback_keeps_playing_on_secondary() {
    let primary_generator = Arc::new(FakeGenerator::new().failing_always());
    let primary_sink = Arc::new(FakeSink::emulated());
    let secondary_generator = Arc::new(FakeGenerator::new());
    let secondary_sink = Arc::new(FakeSink::emulated());

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let notices = event_tx.clone();
    let provider = FallbackProvider::new(
        ProviderPair::new(primary_generator.clone(), primary_sink.clone()),
        ProviderPair::new(secondary_generator.clone(), secondary_sink.clone()),
    )
    .with_listener(move |notice| {
        let _ = notices.send(NarrationEvent::ProviderFallback(notice));
    });
    let provider = Arc::new(provider);

    let handle = PlaybackController::spawn_with_events(
        provider.clone(),
        provider,
        NarrationSettings::default(),
        event_tx,
    );
    handle.load_text("A. B.").await.unwrap();
    handle.play().await.unwrap();

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let done = is_end(&event);
        seen.push(event);
        if done {
            break;
        }
    }

    let fallbacks: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            NarrationEvent::ProviderFallback(notice) => Some(notice.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(fallbacks.len(), 1);
    assert_eq!(fallbacks[0].operation, "generate");
    assert_eq!(fallbacks[0].provider, "fake/fake-sink");

    assert!(!seen.iter().any(is_error));
    assert_eq!(primary_generator.calls(), vec!["A."]);
    assert_eq!(secondary_generator.calls(), vec!["A.", "B."]);
    assert!(primary_sink.plays().is_empty());
    assert_eq!(secondary_sink.plays().len(), 2);
}
