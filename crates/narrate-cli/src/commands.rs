//! Subcommands and their arguments.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use narrate_core::{Granularity, NarrationSettings};

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Narrate a text file, with keyboard controls on stdin
    Read(ReadArgs),

    /// Print how a text file is split into paragraphs and segments
    Segments(SegmentsArgs),
}

/// Arguments for `narrate read`.
#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Text file to narrate (blank lines separate paragraphs)
    pub file: PathBuf,

    /// Voice id passed to the speech endpoint
    #[arg(long)]
    pub voice: Option<String>,

    /// Playback rate (0.5 to 2.0)
    #[arg(long)]
    pub rate: Option<f32>,

    /// Segment by "sentence" or "paragraph"
    #[arg(long)]
    pub granularity: Option<Granularity>,

    /// Seconds of audio to generate ahead of the play head
    #[arg(long)]
    pub lookahead: Option<f64>,

    /// Silence between segments, in milliseconds
    #[arg(long = "gap-ms")]
    pub gap_ms: Option<u64>,

    /// OpenAI-compatible speech endpoint, e.g. http://localhost:8880
    #[arg(long, env = "NARRATE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// API key for the speech endpoint
    #[arg(long = "api-key", env = "NARRATE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name sent to the speech endpoint
    #[arg(long, env = "NARRATE_MODEL")]
    pub model: Option<String>,

    /// Use the built-in tone generator only
    #[arg(long)]
    pub offline: bool,

    /// Paragraph to start from (1-based)
    #[arg(long)]
    pub from: Option<usize>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Write the effective settings back to the settings file
    #[arg(long = "save-settings")]
    pub save_settings: bool,
}

impl ReadArgs {
    /// Apply command-line overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut NarrationSettings) {
        if let Some(voice) = &self.voice {
            settings.voice_id.clone_from(voice);
        }
        if let Some(rate) = self.rate {
            settings.rate = rate;
        }
        if let Some(granularity) = self.granularity {
            settings.granularity = granularity;
        }
        if let Some(lookahead) = self.lookahead {
            settings.lookahead_secs = lookahead;
        }
        if let Some(gap_ms) = self.gap_ms {
            settings.segment_gap_ms = gap_ms;
        }
    }
}

/// Arguments for `narrate segments`.
#[derive(Args, Debug)]
pub struct SegmentsArgs {
    /// Text file to split
    pub file: PathBuf,

    /// Segment by "sentence" or "paragraph"
    #[arg(long, default_value = "sentence")]
    pub granularity: Granularity,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}
