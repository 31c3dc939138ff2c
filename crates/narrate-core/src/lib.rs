//! Core domain types and port definitions for narrate.
//!
//! This crate has no audio or network dependencies. It defines the shapes
//! shared by the narration engine and its adapters:
//!
//! - [`domain`] - segments, clips, playback positions and status
//! - [`ports`] - the [`AudioGenerator`] and [`AudioSink`] seams
//! - [`events`] - notifications emitted by the playback controller
//! - [`settings`] - the immutable per-session configuration snapshot

pub mod domain;
pub mod error;
pub mod events;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{Clip, GenerationKey, Granularity, PlaybackPosition, PlaybackStatus, Segment};
pub use error::NarrationError;
pub use events::{FallbackNotice, NarrationEvent, PositionUpdate};
pub use ports::{
    AudioGenerator, AudioSink, EndCallback, ErrorCallback, GenerationError, PlayOptions,
    SinkCapabilities, SinkError, SynthesisRequest,
};
pub use settings::{
    NarrationSettings, SettingsError, SettingsUpdate, default_settings_path, load_settings,
    save_settings, validate_settings,
};
