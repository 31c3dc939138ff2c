//! Incremental narration engine.
//!
//! Turns article text into speech one segment at a time: playback starts as
//! soon as the first segment is generated, while a background scheduler
//! keeps a budget of contiguous audio generated ahead of the play head.
//!
//! ```text
//! text ─▶ segmenter ─▶ ParagraphCache ◀── BufferScheduler (lookahead)
//!                           │                    ▲
//!                           ▼                    │
//!                    PlaybackController ─────────┘
//!                      │            │
//!                AudioGenerator   AudioSink
//!             (FallbackProvider wraps both)
//! ```
//!
//! The controller runs as a tokio task; drive it through the
//! [`ControllerHandle`] returned by [`PlaybackController::spawn`] and watch
//! [`NarrationEvent`](narrate_core::NarrationEvent)s on the returned
//! receiver.
//!
//! # Features
//!
//! - `rodio-sink` (default): [`RodioSink`] for local speaker output
//! - `http` (default): [`HttpSpeechGenerator`] for OpenAI-compatible endpoints

#[cfg(feature = "rodio-sink")]
pub mod audio_thread;
pub mod backend;
pub mod cache;
pub mod controller;
pub mod fallback;
pub mod pause;
#[cfg(feature = "rodio-sink")]
pub mod playback;
pub mod scheduler;
pub mod segmenter;

// Re-export key types for convenience
#[cfg(feature = "rodio-sink")]
pub use audio_thread::RodioSink;
#[cfg(feature = "http")]
pub use backend::{HttpSpeechConfig, HttpSpeechGenerator};
pub use backend::ToneGenerator;
pub use cache::{CacheEntry, ParagraphCache};
pub use controller::{ControllerHandle, ControllerSnapshot, PlaybackController};
pub use fallback::{FallbackListener, FallbackProvider, ProviderPair};
pub use pause::PauseTracker;
pub use scheduler::{BufferScheduler, RetryDecision};
pub use segmenter::{segment_paragraph, split_paragraphs, split_sentences};
