//! Umbrella error type for narration operations.

use crate::ports::{GenerationError, SinkError};
use crate::settings::SettingsError;

/// Errors surfaced to callers of the narration engine.
#[derive(Debug, thiserror::Error)]
pub enum NarrationError {
    /// Generating audio for a segment failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The audio sink failed.
    #[error(transparent)]
    Playback(#[from] SinkError),

    /// Settings were invalid or could not be persisted.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// There is nothing to narrate.
    #[error("No narratable text")]
    EmptyContent,

    /// A paragraph index past the loaded content.
    #[error("Paragraph {paragraph} is out of range ({paragraph_count} loaded)")]
    OutOfRange {
        paragraph: usize,
        paragraph_count: usize,
    },

    /// The controller task has shut down.
    #[error("Playback controller is no longer running")]
    ControllerClosed,
}
