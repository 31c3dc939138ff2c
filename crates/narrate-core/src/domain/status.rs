//! Playback state machine states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current state of the playback controller.
///
/// ```text
///   Idle ──play──▶ Loading ──clip ready──▶ Playing ◀──▶ Paused
///                                           │  ▲
///                          next not ready   ▼  │ clip ready
///                                         Buffering
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// Nothing playing. Initial and terminal state.
    #[default]
    Idle,

    /// First segment of a fresh position is being generated.
    Loading,

    /// Mid-stream: the next segment was not ready when the previous one ended.
    Buffering,

    /// A clip is sounding.
    Playing,

    /// Playback is paused.
    Paused,
}

impl PlaybackStatus {
    /// Whether a playback session is in progress.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Whether the controller is waiting on a generation to continue.
    #[must_use]
    pub const fn is_waiting(self) -> bool {
        matches!(self, Self::Loading | Self::Buffering)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Buffering => "buffering",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
