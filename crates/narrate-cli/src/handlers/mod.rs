//! Command handlers.
//!
//! Handlers are thin: they read input files, build the engine pieces a
//! command needs and format output for the terminal. Narration logic lives
//! in `narrate-engine`.

pub mod read;
pub mod segments;
