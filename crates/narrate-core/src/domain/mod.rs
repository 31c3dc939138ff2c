//! Domain types for narration playback.
//!
//! These are pure data types with no infrastructure dependencies.

mod clip;
mod segment;
mod status;

pub use clip::Clip;
pub use segment::{GenerationKey, Granularity, PlaybackPosition, Segment};
pub use status::PlaybackStatus;
