//! Command-line front end for the narration engine.
//!
//! ```text
//! narrate read article.txt --endpoint http://localhost:8880 --voice af_heart
//! narrate read article.txt --offline --rate 1.25
//! narrate segments article.txt --granularity paragraph
//! ```

pub mod commands;
pub mod console;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

// Re-export primary types for convenient access
pub use commands::{Commands, ReadArgs, SegmentsArgs};
pub use error::CliError;
pub use parser::Cli;
