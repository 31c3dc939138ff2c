//! Playback controller: the narration state machine.
//!
//! The controller runs as a single tokio task that owns the play head, the
//! [`ParagraphCache`], the [`BufferScheduler`] and the audio sink. Callers
//! talk to it through a cloneable [`ControllerHandle`]; sink callbacks,
//! generation results and timers come back as internal signals. Both
//! streams are drained by one `select!` loop, so every state mutation runs
//! to completion before the next message is looked at.
//!
//! ```text
//!  ControllerHandle ──Command──▶ ┌──────────────────────┐ ──NarrationEvent──▶ UI
//!                                │  PlaybackController  │
//!  generation task ──Signal────▶ │  (cache, scheduler,  │ ──play/stop──▶ AudioSink
//!  sink callbacks  ──Signal────▶ │   position, status)  │
//!  gap/backoff timers ─Signal──▶ └──────────────────────┘ ──generate──▶ AudioGenerator
//! ```
//!
//! At most one generation is in flight. A generation the controller no
//! longer needs is cancelled by dropping its future; the slot only frees
//! once the task reports back, so the generator is never called
//! concurrently.

use std::sync::Arc;
use std::time::Duration;

use narrate_core::{
    AudioGenerator, AudioSink, Clip, GenerationError, GenerationKey, NarrationError,
    NarrationEvent, NarrationSettings, PlayOptions, PlaybackPosition, PlaybackStatus,
    PositionUpdate, SettingsUpdate, SinkError, SynthesisRequest, validate_settings,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::ParagraphCache;
use crate::pause::PauseTracker;
use crate::scheduler::{BufferScheduler, RetryDecision};
use crate::segmenter::split_paragraphs;

type Reply<T> = oneshot::Sender<Result<T, NarrationError>>;

// ── Commands and signals ───────────────────────────────────────────

enum Command {
    Load {
        paragraphs: Vec<String>,
        reply: Reply<usize>,
    },
    Play {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    SkipForward {
        reply: Reply<()>,
    },
    SkipBackward {
        reply: Reply<()>,
    },
    Seek {
        paragraph: usize,
        reply: Reply<()>,
    },
    UpdateSettings {
        update: SettingsUpdate,
        reply: Reply<NarrationSettings>,
    },
    ClearCache {
        reply: Reply<()>,
    },
    Snapshot {
        reply: Reply<ControllerSnapshot>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

enum Outcome {
    Finished(Result<Clip, GenerationError>),
    Abandoned,
}

enum Signal {
    Generated {
        id: u64,
        key: GenerationKey,
        text: String,
        outcome: Outcome,
        elapsed: Duration,
    },
    ClipEnded {
        ticket: u64,
    },
    ClipFailed {
        ticket: u64,
        error: SinkError,
    },
    GapElapsed {
        ticket: u64,
    },
    BackoffElapsed {
        ticket: u64,
    },
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Point-in-time view of the controller, for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub status: PlaybackStatus,
    pub position: PlaybackPosition,
    pub paragraph_count: usize,
    pub segment_count: usize,
    /// Contiguous generated audio from the play head, in seconds.
    pub buffered_secs: f64,
    /// Whether a generation is currently running.
    pub generating: bool,
    pub lookahead_armed: bool,
    pub consecutive_failures: u32,
}

// ── Handle ─────────────────────────────────────────────────────────

/// Cloneable handle to a running [`PlaybackController`].
///
/// Every method waits for the controller to process the command, so events
/// caused by a command are already queued when the method returns.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ControllerHandle {
    /// Load paragraphs, resetting to `(0, 0)` and idle.
    ///
    /// Empty and whitespace-only paragraphs are dropped. Returns the number
    /// of paragraphs loaded.
    pub async fn load(&self, paragraphs: Vec<String>) -> Result<usize, NarrationError> {
        self.request(|reply| Command::Load { paragraphs, reply })
            .await
    }

    /// Split `text` at blank lines and load the result.
    pub async fn load_text(&self, text: &str) -> Result<usize, NarrationError> {
        self.load(split_paragraphs(text)).await
    }

    /// Start playback, or resume from pause.
    pub async fn play(&self) -> Result<(), NarrationError> {
        self.request(|reply| Command::Play { reply }).await
    }

    /// Alias of [`play`](Self::play) for symmetry with [`pause`](Self::pause).
    pub async fn resume(&self) -> Result<(), NarrationError> {
        self.play().await
    }

    pub async fn pause(&self) -> Result<(), NarrationError> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Stop playback and rewind to `(0, 0)`. The cache is kept.
    pub async fn stop(&self) -> Result<(), NarrationError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn skip_forward(&self) -> Result<(), NarrationError> {
        self.request(|reply| Command::SkipForward { reply }).await
    }

    pub async fn skip_backward(&self) -> Result<(), NarrationError> {
        self.request(|reply| Command::SkipBackward { reply }).await
    }

    /// Jump to the start of `paragraph`. Plays from there if a session is
    /// active, otherwise only moves the play head.
    pub async fn seek(&self, paragraph: usize) -> Result<(), NarrationError> {
        self.request(|reply| Command::Seek { paragraph, reply })
            .await
    }

    /// Merge and validate a settings change. Applies from the next
    /// generated or played segment. Returns the new settings.
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<NarrationSettings, NarrationError> {
        self.request(|reply| Command::UpdateSettings { update, reply })
            .await
    }

    /// Drop all generated audio for the loaded content.
    pub async fn clear_cache(&self) -> Result<(), NarrationError> {
        self.request(|reply| Command::ClearCache { reply }).await
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot, NarrationError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop playback and end the controller task.
    pub async fn shutdown(&self) -> Result<(), NarrationError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, NarrationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .map_err(|_| NarrationError::ControllerClosed)?;
        reply_rx
            .await
            .map_err(|_| NarrationError::ControllerClosed)?
    }
}

// ── Controller ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Foreground,
    Background,
}

struct InFlight {
    id: u64,
    key: GenerationKey,
    origin: Origin,
    cancel: CancellationToken,
    abandoned: bool,
}

/// How to leave `Paused`.
#[derive(Debug, Clone, Copy)]
enum Resume {
    /// The sink paused the clip itself.
    Native,
    /// The sink was stopped; replay the clip from `offset`.
    Replay { offset: Duration, rate: f32 },
    /// Paused during the inter-segment gap.
    Gap,
    /// Paused while waiting on a generation.
    Pending { waiting: PlaybackStatus },
    /// The clip drained just as it was paused.
    Finished,
}

/// The narration state machine. See the module docs.
pub struct PlaybackController {
    generator: Arc<dyn AudioGenerator>,
    sink: Arc<dyn AudioSink>,
    settings: NarrationSettings,

    cache: ParagraphCache,
    scheduler: BufferScheduler,
    status: PlaybackStatus,
    position: PlaybackPosition,

    session: CancellationToken,
    in_flight: Option<InFlight>,
    /// Segment the play head is waiting on.
    awaiting: Option<GenerationKey>,
    next_generation_id: u64,

    /// Clip handed to the sink (kept while paused for replay).
    current: Option<Arc<Clip>>,
    clock: PauseTracker,
    resume: Option<Resume>,
    play_ticket: u64,
    gap_ticket: Option<u64>,
    next_timer_ticket: u64,

    signal_tx: mpsc::UnboundedSender<Signal>,
    event_tx: mpsc::UnboundedSender<NarrationEvent>,
}

impl PlaybackController {
    /// Spawn a controller on the current tokio runtime.
    pub fn spawn(
        generator: Arc<dyn AudioGenerator>,
        sink: Arc<dyn AudioSink>,
        settings: NarrationSettings,
    ) -> (ControllerHandle, mpsc::UnboundedReceiver<NarrationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = Self::spawn_with_events(generator, sink, settings, event_tx);
        (handle, event_rx)
    }

    /// Spawn a controller that emits into an existing event channel.
    ///
    /// Lets other components (such as a fallback provider) share the same
    /// event stream.
    pub fn spawn_with_events(
        generator: Arc<dyn AudioGenerator>,
        sink: Arc<dyn AudioSink>,
        settings: NarrationSettings,
        event_tx: mpsc::UnboundedSender<NarrationEvent>,
    ) -> ControllerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (controller, signal_rx) = Self::new(generator, sink, settings, event_tx);
        tokio::spawn(controller.run(command_rx, signal_rx));

        ControllerHandle {
            commands: command_tx,
        }
    }

    fn new(
        generator: Arc<dyn AudioGenerator>,
        sink: Arc<dyn AudioSink>,
        settings: NarrationSettings,
        event_tx: mpsc::UnboundedSender<NarrationEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        tracing::info!(
            generator = generator.name(),
            sink = sink.name(),
            native_pause = sink.capabilities().native_pause,
            "Starting playback controller"
        );

        let controller = Self {
            generator,
            sink,
            cache: ParagraphCache::new(settings.granularity),
            settings,
            scheduler: BufferScheduler::new(),
            status: PlaybackStatus::Idle,
            position: PlaybackPosition::START,
            session: CancellationToken::new(),
            in_flight: None,
            awaiting: None,
            next_generation_id: 0,
            current: None,
            clock: PauseTracker::default(),
            resume: None,
            play_ticket: 0,
            gap_ticket: None,
            next_timer_ticket: 0,
            signal_tx,
            event_tx,
        };
        (controller, signal_rx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
    ) {
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown();
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(signal) = signals.recv() => self.handle_signal(signal),
            }
        }

        tracing::info!("Playback controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Load { paragraphs, reply } => {
                let _ = reply.send(Ok(self.load(paragraphs)));
            }
            Command::Play { reply } => {
                let _ = reply.send(self.play());
            }
            Command::Pause { reply } => {
                self.pause();
                let _ = reply.send(Ok(()));
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(Ok(()));
            }
            Command::SkipForward { reply } => {
                self.skip_forward();
                let _ = reply.send(Ok(()));
            }
            Command::SkipBackward { reply } => {
                self.skip_backward();
                let _ = reply.send(Ok(()));
            }
            Command::Seek { paragraph, reply } => {
                let _ = reply.send(self.seek(paragraph));
            }
            Command::UpdateSettings { update, reply } => {
                let _ = reply.send(self.update_settings(&update));
            }
            Command::ClearCache { reply } => {
                self.clear_cache();
                let _ = reply.send(Ok(()));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            Command::Shutdown { reply } => {
                // Handled by the run loop.
                let _ = reply.send(Ok(()));
            }
        }
        self.pump();
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Generated {
                id,
                key,
                text,
                outcome,
                elapsed,
            } => self.on_generated(id, key, &text, outcome, elapsed),
            Signal::ClipEnded { ticket } => self.on_clip_ended(ticket),
            Signal::ClipFailed { ticket, error } => {
                if ticket == self.play_ticket && self.current.is_some() {
                    self.fail(&NarrationError::Playback(error));
                } else {
                    tracing::debug!(ticket, error = %error, "Ignoring error from superseded clip");
                }
            }
            Signal::GapElapsed { ticket } => {
                if self.gap_ticket == Some(ticket) && self.status == PlaybackStatus::Playing {
                    self.gap_ticket = None;
                    self.advance();
                }
            }
            Signal::BackoffElapsed { ticket } => {
                if self.scheduler.backoff_elapsed(ticket) {
                    tracing::debug!(ticket, "Lookahead backoff elapsed");
                }
            }
        }
        self.pump();
    }

    // ── Operations ─────────────────────────────────────────────────

    fn load(&mut self, paragraphs: Vec<String>) -> usize {
        let paragraphs: Vec<String> = paragraphs
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        self.halt();
        let count = paragraphs.len();
        let kept = self.cache.load(paragraphs, self.settings.granularity);
        tracing::info!(
            paragraphs = count,
            reused = kept,
            granularity = %self.settings.granularity,
            "Loaded content"
        );

        self.position = PlaybackPosition::START;
        self.announce_position();
        self.set_status(PlaybackStatus::Idle);
        count
    }

    fn play(&mut self) -> Result<(), NarrationError> {
        match self.status {
            PlaybackStatus::Paused => {
                self.resume_playback();
                Ok(())
            }
            PlaybackStatus::Idle => {
                if self.cache.is_empty() {
                    return Err(NarrationError::EmptyContent);
                }
                tracing::info!(position = %self.position, "Starting playback");
                self.scheduler.arm();
                self.announce_position();
                self.begin(PlaybackStatus::Loading);
                Ok(())
            }
            PlaybackStatus::Loading | PlaybackStatus::Buffering | PlaybackStatus::Playing => {
                tracing::debug!(status = %self.status, "Already playing");
                Ok(())
            }
        }
    }

    fn pause(&mut self) {
        match self.status {
            PlaybackStatus::Playing => {
                let resume = if self.gap_ticket.take().is_some() {
                    Resume::Gap
                } else {
                    let offset = self.clip_offset();
                    let rate = self.clock.rate();
                    self.clock.pause();
                    if self.sink.capabilities().native_pause && self.pause_natively() {
                        tracing::debug!(offset_ms = offset.as_millis(), "Native pause");
                        Resume::Native
                    } else {
                        self.invalidate_playback();
                        self.sink.stop();
                        tracing::debug!(offset_ms = offset.as_millis(), "Emulated pause");
                        Resume::Replay { offset, rate }
                    }
                };
                self.resume = Some(resume);
                self.set_status(PlaybackStatus::Paused);
            }
            waiting @ (PlaybackStatus::Loading | PlaybackStatus::Buffering) => {
                self.resume = Some(Resume::Pending { waiting });
                self.set_status(PlaybackStatus::Paused);
            }
            PlaybackStatus::Paused | PlaybackStatus::Idle => {}
        }
    }

    fn stop(&mut self) {
        if self.status.is_active() {
            tracing::info!(position = %self.position, "Stopping playback");
        }
        self.halt();
        self.set_position(PlaybackPosition::START);
        self.set_status(PlaybackStatus::Idle);
    }

    fn skip_forward(&mut self) {
        if !self.status.is_active() {
            tracing::debug!("Skip ignored while idle");
            return;
        }
        let next = self.position.paragraph + 1;
        if next >= self.cache.paragraph_count() {
            tracing::debug!("Skipped past the last paragraph");
            self.end_of_content();
            return;
        }
        self.restart_at(PlaybackPosition::paragraph_start(next));
    }

    fn skip_backward(&mut self) {
        if !self.status.is_active() {
            tracing::debug!("Skip ignored while idle");
            return;
        }
        let previous = self.position.paragraph.saturating_sub(1);
        self.restart_at(PlaybackPosition::paragraph_start(previous));
    }

    fn seek(&mut self, paragraph: usize) -> Result<(), NarrationError> {
        let paragraph_count = self.cache.paragraph_count();
        if paragraph >= paragraph_count {
            return Err(NarrationError::OutOfRange {
                paragraph,
                paragraph_count,
            });
        }

        let target = PlaybackPosition::paragraph_start(paragraph);
        if self.status.is_active() {
            self.restart_at(target);
        } else {
            self.set_position(target);
        }
        Ok(())
    }

    fn update_settings(
        &mut self,
        update: &SettingsUpdate,
    ) -> Result<NarrationSettings, NarrationError> {
        let mut merged = self.settings.clone();
        merged.merge(update);
        validate_settings(&merged)?;

        if merged.granularity != self.cache.granularity() {
            tracing::info!(
                granularity = %merged.granularity,
                "Granularity change applies on next load"
            );
        }
        tracing::debug!(voice = %merged.voice_id, rate = merged.rate, "Settings updated");
        self.settings = merged;

        if self.status.is_active() {
            // A larger budget may need more lookahead.
            self.scheduler.arm();
        }
        Ok(self.settings.clone())
    }

    fn clear_cache(&mut self) {
        tracing::info!("Clearing generated audio");
        self.cache.clear();
        if self.status.is_active() {
            self.scheduler.arm();
        }
    }

    fn snapshot(&mut self) -> ControllerSnapshot {
        let PlaybackPosition { paragraph, segment } = self.position;
        ControllerSnapshot {
            status: self.status,
            position: self.position,
            paragraph_count: self.cache.paragraph_count(),
            segment_count: self.cache.segment_count(paragraph),
            buffered_secs: self
                .cache
                .buffered_duration_from(paragraph, segment)
                .as_secs_f64(),
            generating: self.in_flight.is_some(),
            lookahead_armed: self.scheduler.is_armed(),
            consecutive_failures: self.scheduler.consecutive_failures(),
        }
    }

    fn shutdown(&mut self) {
        tracing::info!("Shutting down playback controller");
        self.halt();
        self.set_status(PlaybackStatus::Idle);
    }

    // ── Transitions ────────────────────────────────────────────────

    /// Start a fresh session at `target`, as `play()` would.
    fn restart_at(&mut self, target: PlaybackPosition) {
        self.halt();
        self.set_position(target);
        self.scheduler.arm();
        self.begin(PlaybackStatus::Loading);
    }

    /// Play the segment at the play head, or wait for it in `waiting`.
    fn begin(&mut self, waiting: PlaybackStatus) {
        let key = GenerationKey::from(self.position);
        if let Some(clip) = self.cache.clip(key) {
            self.start_clip(clip, Duration::ZERO);
        } else {
            tracing::debug!(%key, status = %waiting, "Waiting for segment");
            self.awaiting = Some(key);
            self.set_status(waiting);
        }
    }

    fn start_clip(&mut self, clip: Arc<Clip>, offset: Duration) {
        let rate = self.settings.effective_rate();
        self.play_clip(clip, offset, rate);
    }

    fn play_clip(&mut self, clip: Arc<Clip>, offset: Duration, rate: f32) {
        self.invalidate_playback();
        let ticket = self.play_ticket;

        let end_tx = self.signal_tx.clone();
        let error_tx = self.signal_tx.clone();
        let options = PlayOptions::new(
            rate,
            Box::new(move || {
                let _ = end_tx.send(Signal::ClipEnded { ticket });
            }),
            Box::new(move |error| {
                let _ = error_tx.send(Signal::ClipFailed { ticket, error });
            }),
        )
        .starting_at(offset);

        tracing::debug!(
            position = %self.position,
            duration_ms = clip.duration().as_millis(),
            offset_ms = offset.as_millis(),
            rate,
            "Playing segment"
        );

        match self.sink.play(Arc::clone(&clip), options) {
            Ok(()) => {
                self.current = Some(clip);
                self.clock.start(offset, rate);
                self.awaiting = None;
                self.resume = None;
                self.set_status(PlaybackStatus::Playing);
            }
            Err(e) => self.fail(&NarrationError::Playback(e)),
        }
    }

    fn on_clip_ended(&mut self, ticket: u64) {
        if ticket != self.play_ticket {
            tracing::debug!(ticket, "Ignoring end of superseded clip");
            return;
        }
        match self.status {
            PlaybackStatus::Playing => self.clip_finished(),
            PlaybackStatus::Paused if matches!(self.resume, Some(Resume::Native)) => {
                // The sink has nothing left to resume.
                tracing::debug!(ticket, "Clip ended while pausing");
                self.current = None;
                self.clock.reset();
                self.resume = Some(Resume::Finished);
            }
            _ => tracing::debug!(ticket, status = %self.status, "Ignoring clip end"),
        }
    }

    /// The clip at the play head is done: wait out the gap, then advance.
    fn clip_finished(&mut self) {
        self.current = None;
        self.clock.reset();

        let gap = self.settings.segment_gap();
        if gap.is_zero() {
            self.advance();
        } else {
            let ticket = self.next_timer();
            self.gap_ticket = Some(ticket);
            self.schedule(gap, Signal::GapElapsed { ticket });
        }
    }

    /// Move to the segment after the play head.
    fn advance(&mut self) {
        let Some(next) = self.next_position() else {
            tracing::info!("Reached end of content");
            self.end_of_content();
            return;
        };

        self.set_position(next);
        self.scheduler.arm();
        self.begin(PlaybackStatus::Buffering);
    }

    fn resume_playback(&mut self) {
        match self.resume.take() {
            Some(Resume::Native) => {
                let offset = self.clock.offset();
                let rate = self.clock.rate();
                match self.sink.resume() {
                    Ok(()) => {
                        self.clock.start(offset, rate);
                        self.set_status(PlaybackStatus::Playing);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Native resume failed, replaying from offset");
                        self.invalidate_playback();
                        self.sink.stop();
                        self.replay_current(offset, rate);
                    }
                }
            }
            Some(Resume::Replay { offset, rate }) => self.replay_current(offset, rate),
            Some(Resume::Gap) => self.advance(),
            Some(Resume::Pending { waiting }) => self.begin(waiting),
            Some(Resume::Finished) => {
                self.set_status(PlaybackStatus::Playing);
                self.clip_finished();
            }
            None => self.begin(PlaybackStatus::Loading),
        }
    }

    fn replay_current(&mut self, offset: Duration, rate: f32) {
        match self.current.clone() {
            Some(clip) => {
                let offset = offset.min(clip.duration());
                self.play_clip(clip, offset, rate);
            }
            None => self.begin(PlaybackStatus::Loading),
        }
    }

    fn end_of_content(&mut self) {
        self.halt();
        self.set_position(PlaybackPosition::START);
        self.set_status(PlaybackStatus::Idle);
        self.emit(NarrationEvent::EndOfContent);
    }

    /// Surface an error and go idle. The play head stays where it was.
    fn fail(&mut self, error: &NarrationError) {
        tracing::warn!(position = %self.position, error = %error, "Playback failed");
        self.halt();
        self.set_status(PlaybackStatus::Idle);
        self.emit(NarrationEvent::Error {
            message: error.to_string(),
        });
    }

    /// End the current session: cancel generation and timers, silence the
    /// sink. Leaves status, position and cache alone.
    fn halt(&mut self) {
        self.session.cancel();
        self.session = CancellationToken::new();
        if let Some(flight) = self.in_flight.as_mut() {
            flight.abandoned = true;
        }

        self.scheduler.cancel();
        self.awaiting = None;
        self.resume = None;
        self.gap_ticket = None;

        if self.status.is_active() || self.current.is_some() {
            self.invalidate_playback();
            self.sink.stop();
        }
        self.current = None;
        self.clock.reset();
    }

    // ── Generation ─────────────────────────────────────────────────

    /// Issue the next generation if the slot is free.
    ///
    /// Foreground needs go first. A background generation for a different
    /// key is cancelled in favour of the foreground need; one for the same
    /// key is adopted.
    fn pump(&mut self) {
        // A cached need starts playing, then lookahead continues below.
        if let Some(need) = self.awaiting {
            if let Some(clip) = self.cache.clip(need) {
                if self.status.is_waiting() {
                    self.start_clip(clip, Duration::ZERO);
                }
            }
        }

        // Paused while waiting keeps `awaiting` for resume; a cached need is
        // no longer a generation need.
        let need = self.awaiting.filter(|key| self.cache.clip(*key).is_none());

        if let Some(flight) = self.in_flight.as_mut() {
            if let Some(need) = need {
                if !flight.abandoned && flight.origin == Origin::Background {
                    if flight.key == need {
                        tracing::debug!(key = %need, "Adopting lookahead generation");
                        flight.origin = Origin::Foreground;
                    } else {
                        tracing::debug!(
                            abandoned = %flight.key,
                            needed = %need,
                            "Cancelling lookahead for foreground need"
                        );
                        flight.abandoned = true;
                        flight.cancel.cancel();
                    }
                }
            }
            return;
        }

        if let Some(need) = need {
            self.issue(need, Origin::Foreground);
            return;
        }

        if !self.status.is_active() || !self.scheduler.can_issue() {
            return;
        }

        let budget = self.settings.lookahead();
        match BufferScheduler::next_target(&mut self.cache, self.position, budget) {
            Some(key) => self.issue(key, Origin::Background),
            None => self.scheduler.idle(),
        }
    }

    fn issue(&mut self, key: GenerationKey, origin: Origin) {
        let Some(segment) = self.cache.segment(key) else {
            tracing::warn!(%key, "No segment to generate");
            if origin == Origin::Foreground {
                // Nothing will ever arrive for the play head.
                self.fail(&NarrationError::OutOfRange {
                    paragraph: key.paragraph,
                    paragraph_count: self.cache.paragraph_count(),
                });
            }
            return;
        };

        self.next_generation_id += 1;
        let id = self.next_generation_id;
        let cancel = self.session.child_token();
        let request = SynthesisRequest::new(segment.text, self.settings.voice_id.clone())
            .with_pitch(self.settings.pitch);

        tracing::debug!(%key, ?origin, id, "Generating segment");

        let generator = Arc::clone(&self.generator);
        let signal_tx = self.signal_tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => Outcome::Abandoned,
                result = generator.generate(&request) => Outcome::Finished(result),
            };
            let _ = signal_tx.send(Signal::Generated {
                id,
                key,
                text: request.text,
                outcome,
                elapsed: started.elapsed(),
            });
        });

        self.in_flight = Some(InFlight {
            id,
            key,
            origin,
            cancel,
            abandoned: false,
        });
    }

    fn on_generated(
        &mut self,
        id: u64,
        key: GenerationKey,
        text: &str,
        outcome: Outcome,
        elapsed: Duration,
    ) {
        let flight = match self.in_flight.take() {
            Some(flight) if flight.id == id => flight,
            other => {
                self.in_flight = other;
                tracing::warn!(id, %key, "Result for unknown generation");
                return;
            }
        };

        let result = match outcome {
            Outcome::Abandoned => {
                tracing::debug!(%key, "Generation cancelled");
                return;
            }
            Outcome::Finished(result) => result,
        };
        let foreground = !flight.abandoned && self.awaiting == Some(key);

        match result {
            Ok(clip) => {
                let clip = Arc::new(clip.with_generation_time(elapsed));
                tracing::debug!(
                    %key,
                    duration_ms = clip.duration().as_millis(),
                    generation_ms = elapsed.as_millis(),
                    late = flight.abandoned,
                    "Segment generated"
                );

                // Late results are still valid audio if the text is unchanged.
                let still_valid = self
                    .cache
                    .segment(key)
                    .is_some_and(|segment| segment.text == text);
                if still_valid {
                    self.cache.record_clip(key, clip);
                }
                if flight.origin == Origin::Background && !flight.abandoned {
                    self.scheduler.record_success();
                }
            }
            Err(e) if foreground => {
                self.fail(&NarrationError::Generation(e));
            }
            Err(e) if flight.abandoned => {
                tracing::debug!(%key, error = %e, "Cancelled generation failed");
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Lookahead generation failed");
                let decision = self.scheduler.record_failure(
                    self.settings.error_backoff(),
                    self.settings.max_lookahead_retries,
                );
                match decision {
                    RetryDecision::Backoff { delay, ticket } => {
                        self.schedule(delay, Signal::BackoffElapsed { ticket });
                    }
                    RetryDecision::GiveUp { failures } => {
                        tracing::warn!(failures, "Lookahead giving up until playback moves on");
                    }
                }
            }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn next_position(&mut self) -> Option<PlaybackPosition> {
        let PlaybackPosition { paragraph, segment } = self.position;
        if segment + 1 < self.cache.segment_count(paragraph) {
            return Some(PlaybackPosition::new(paragraph, segment + 1));
        }
        let next = paragraph + 1;
        (next < self.cache.paragraph_count()).then(|| PlaybackPosition::paragraph_start(next))
    }

    fn clip_offset(&self) -> Duration {
        let elapsed = self.clock.elapsed();
        self.current
            .as_ref()
            .map_or(elapsed, |clip| elapsed.min(clip.duration()))
    }

    fn pause_natively(&self) -> bool {
        match self.sink.pause() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Native pause failed, emulating");
                false
            }
        }
    }

    /// Make callbacks from the current clip stale.
    const fn invalidate_playback(&mut self) {
        self.play_ticket += 1;
    }

    const fn next_timer(&mut self) -> u64 {
        self.next_timer_ticket += 1;
        self.next_timer_ticket
    }

    fn schedule(&self, delay: Duration, signal: Signal) {
        let signal_tx = self.signal_tx.clone();
        let cancel = self.session.child_token();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = signal_tx.send(signal);
                }
            }
        });
    }

    fn set_position(&mut self, position: PlaybackPosition) {
        if self.position != position {
            tracing::debug!(old = %self.position, new = %position, "Position changed");
            self.position = position;
            self.announce_position();
        }
    }

    fn announce_position(&mut self) {
        let PlaybackPosition { paragraph, segment } = self.position;
        let update = PositionUpdate {
            paragraph,
            segment,
            paragraph_count: self.cache.paragraph_count(),
            segment_count: self.cache.segment_count(paragraph),
        };
        self.emit(NarrationEvent::PositionChanged(update));
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        if self.status != status {
            tracing::debug!(old = ?self.status, new = ?status, "Playback state transition");
            self.status = status;
            self.emit(NarrationEvent::StatusChanged { status });
        }
    }

    fn emit(&self, event: NarrationEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("Narration event receiver dropped");
        }
    }
}
