//! Port definitions (trait abstractions) for the speech backends.
//!
//! Ports define the interfaces the engine expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No `rodio`, `reqwest` or model types in any signature
//! - Both traits are object-safe (`Arc<dyn AudioGenerator>`, `Arc<dyn AudioSink>`)
//! - Backend-specific state (HTTP clients, model handles) lives in the adapter
//!   and is reset through the trait, never through module-level globals

pub mod generator;
pub mod sink;

pub use generator::{AudioGenerator, GenerationError, SynthesisRequest};
pub use sink::{
    AudioSink, EndCallback, ErrorCallback, PlayOptions, SinkCapabilities, SinkError,
};
