//! CLI-specific error types and mappings.
//!
//! Maps [`NarrationError`] to exit codes and user-facing messages.

use std::path::Path;

use narrate_core::NarrationError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine error.
    #[error("{0}")]
    Narration(String),

    /// Argument error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The audio device or speech backend could not be set up.
    #[error("Audio setup failed: {0}")]
    Audio(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Narration(_) => 1,
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Audio(_) => 69,    // EX_UNAVAILABLE
            Self::Io(_) => 74,       // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
        }
    }

    /// Error for an unreadable input file.
    pub fn read_file(path: &Path, err: &std::io::Error) -> Self {
        Self::Io(format!("{}: {err}", path.display()))
    }
}

impl From<NarrationError> for CliError {
    fn from(err: NarrationError) -> Self {
        match err {
            NarrationError::Settings(e) => Self::Config(e.to_string()),
            e @ (NarrationError::OutOfRange { .. } | NarrationError::EmptyContent) => {
                Self::Arguments(e.to_string())
            }
            e => Self::Narration(e.to_string()),
        }
    }
}

/// Exit code for an error returned from a command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CliError>().map_or(1, CliError::exit_code)
}
