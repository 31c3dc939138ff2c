//! Dedicated audio thread and the [`RodioSink`] adapter.
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so the
//! [`ClipPlayer`] is confined to one OS thread and every sink call is
//! routed to it over a channel. [`RodioSink`] is the `Send + Sync` proxy the
//! controller holds.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use narrate_core::{AudioSink, Clip, PlayOptions, SinkCapabilities, SinkError};

use crate::playback::ClipPlayer;

// ── Commands ───────────────────────────────────────────────────────

enum AudioCommand {
    Play {
        clip: Arc<Clip>,
        options: PlayOptions,
        reply: mpsc::Sender<Result<(), SinkError>>,
    },

    /// Fire-and-forget.
    Stop,

    Pause {
        reply: mpsc::Sender<Result<(), SinkError>>,
    },

    Resume {
        reply: mpsc::Sender<Result<(), SinkError>>,
    },

    Shutdown,
}

// ── Sink (Send + Sync proxy) ───────────────────────────────────────

/// Local speaker output through `rodio`.
///
/// Supports native pause, starting at an offset and playback speed.
/// Request/reply calls block the caller for the duration of a local channel
/// round trip plus the rodio call itself.
pub struct RodioSink {
    cmd_tx: mpsc::Sender<AudioCommand>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl RodioSink {
    /// Spawn the audio thread and open the default output device.
    ///
    /// Device errors from the audio thread are returned here.
    pub fn spawn() -> Result<Self, SinkError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<AudioCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), SinkError>>();

        let thread = thread::Builder::new()
            .name("narrate-audio".into())
            .spawn(move || Self::run(&cmd_rx, &init_tx))
            .map_err(|e| SinkError::Output(format!("failed to spawn audio thread: {e}")))?;

        init_rx.recv().map_err(|_| SinkError::ThreadDied)??;

        Ok(Self {
            cmd_tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    fn send_and_recv(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<(), SinkError>>) -> AudioCommand,
    ) -> Result<(), SinkError> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| SinkError::ThreadDied)?;
        rx.recv().map_err(|_| SinkError::ThreadDied)?
    }

    // ── Audio thread event loop ────────────────────────────────────

    fn run(cmd_rx: &mpsc::Receiver<AudioCommand>, init_tx: &mpsc::Sender<Result<(), SinkError>>) {
        let mut player = match ClipPlayer::new() {
            Ok(player) => player,
            Err(e) => {
                let _ = init_tx.send(Err(e));
                return;
            }
        };

        if init_tx.send(Ok(())).is_err() {
            return;
        }

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                AudioCommand::Play {
                    clip,
                    options,
                    reply,
                } => {
                    let _ = reply.send(player.play(&clip, options));
                }

                AudioCommand::Stop => player.stop(),

                AudioCommand::Pause { reply } => {
                    player.pause();
                    let _ = reply.send(Ok(()));
                }

                AudioCommand::Resume { reply } => {
                    player.resume();
                    let _ = reply.send(Ok(()));
                }

                AudioCommand::Shutdown => break,
            }
        }

        // `player` is dropped here, on the audio thread.
        tracing::debug!("Audio thread shutting down");
    }
}

impl AudioSink for RodioSink {
    fn name(&self) -> &'static str {
        "rodio"
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities { native_pause: true }
    }

    fn play(&self, clip: Arc<Clip>, options: PlayOptions) -> Result<(), SinkError> {
        self.send_and_recv(|reply| AudioCommand::Play {
            clip,
            options,
            reply,
        })
    }

    fn stop(&self) {
        let _ = self.cmd_tx.send(AudioCommand::Stop);
    }

    fn pause(&self) -> Result<(), SinkError> {
        self.send_and_recv(|reply| AudioCommand::Pause { reply })
    }

    fn resume(&self) -> Result<(), SinkError> {
        self.send_and_recv(|reply| AudioCommand::Resume { reply })
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        // The thread may already be dead.
        let _ = self.cmd_tx.send(AudioCommand::Shutdown);
        let handle = self.thread.get_mut().ok().and_then(Option::take);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}
