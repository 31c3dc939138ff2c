//! Concrete [`AudioGenerator`](narrate_core::AudioGenerator) backends.
//!
//! | Feature | Module     | Backend                                       |
//! |---------|------------|-----------------------------------------------|
//! | always  | [`tone`]   | offline placeholder tone, one beat per word   |
//! | `http`  | [`http`]   | OpenAI-compatible `/v1/audio/speech` endpoint |

#[cfg(feature = "http")]
pub mod http;
pub mod tone;

#[cfg(feature = "http")]
pub use http::{HttpSpeechConfig, HttpSpeechGenerator};
pub use tone::ToneGenerator;
