//! Notifications emitted by the playback controller.
//!
//! Events are delivered synchronously in the order they happen, one per
//! change, and are the only externally observable effects besides audio.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag so adapters can forward them as-is:
//!
//! ```json
//! { "type": "position_changed", "paragraph": 2, "segment": 0, "paragraphCount": 9, "segmentCount": 4 }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{PlaybackPosition, PlaybackStatus};

/// Position change payload with totals for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    /// Current paragraph index.
    pub paragraph: usize,
    /// Current segment index within the paragraph.
    pub segment: usize,
    /// Number of paragraphs loaded.
    pub paragraph_count: usize,
    /// Number of segments in the current paragraph.
    pub segment_count: usize,
}

impl PositionUpdate {
    #[must_use]
    pub const fn position(&self) -> PlaybackPosition {
        PlaybackPosition::new(self.paragraph, self.segment)
    }
}

/// Emitted when a fallback provider abandons its primary backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackNotice {
    /// Operation that failed on the primary (`"generate"`, `"play"`, ...).
    pub operation: String,
    /// The error that triggered the switch.
    pub error: String,
    /// Backend used from now on.
    pub provider: String,
}

/// Events emitted by the playback controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NarrationEvent {
    /// Controller status changed.
    StatusChanged {
        status: PlaybackStatus,
    },

    /// The play head moved.
    PositionChanged(PositionUpdate),

    /// The last segment finished, or a skip ran past the last paragraph.
    EndOfContent,

    /// A generation needed right now, or the sink, failed. The controller is
    /// idle when this arrives.
    Error {
        message: String,
    },

    /// The speech provider switched to its secondary backend.
    ProviderFallback(FallbackNotice),
}
