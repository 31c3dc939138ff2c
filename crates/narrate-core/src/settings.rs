//! Narration settings, validation and persistence.
//!
//! [`NarrationSettings`] is the immutable snapshot the controller reads at
//! the start of each segment. Changing settings mid-session affects the next
//! generated or played segment, never one already in the cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Granularity;

/// Default lookahead budget in seconds.
pub const DEFAULT_LOOKAHEAD_SECS: f64 = 10.0;

/// Default pause after a failed background generation.
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 500;

/// Default cap on consecutive background generation failures.
pub const DEFAULT_MAX_LOOKAHEAD_RETRIES: u32 = 8;

/// Accepted playback rate range.
pub const RATE_RANGE: (f32, f32) = (0.5, 2.0);

/// Settings snapshot for a narration session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationSettings {
    /// Voice identifier passed to the generator.
    pub voice_id: String,

    /// Playback rate multiplier, clamped to [`RATE_RANGE`] when used.
    pub rate: f32,

    /// Pitch multiplier passed to the generator.
    pub pitch: f32,

    /// Silence inserted between consecutive segments, in milliseconds.
    pub segment_gap_ms: u64,

    /// Target seconds of contiguous generated audio kept ahead of the play head.
    pub lookahead_secs: f64,

    /// Sentence or paragraph segments. Takes effect on the next load.
    pub granularity: Granularity,

    /// Delay before retrying a failed background generation, in milliseconds.
    pub error_backoff_ms: u64,

    /// Consecutive background failures tolerated before lookahead gives up
    /// until playback moves on. `None` retries forever.
    pub max_lookahead_retries: Option<u32>,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            voice_id: "alloy".to_string(),
            rate: 1.0,
            pitch: 1.0,
            segment_gap_ms: 0,
            lookahead_secs: DEFAULT_LOOKAHEAD_SECS,
            granularity: Granularity::Sentence,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
            max_lookahead_retries: Some(DEFAULT_MAX_LOOKAHEAD_RETRIES),
        }
    }
}

impl NarrationSettings {
    /// Rate clamped to the supported range.
    #[must_use]
    pub fn effective_rate(&self) -> f32 {
        self.rate.clamp(RATE_RANGE.0, RATE_RANGE.1)
    }

    #[must_use]
    pub const fn segment_gap(&self) -> Duration {
        Duration::from_millis(self.segment_gap_ms)
    }

    /// Lookahead budget. Non-finite or negative values collapse to zero.
    #[must_use]
    pub fn lookahead(&self) -> Duration {
        Duration::try_from_secs_f64(self.lookahead_secs).unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Apply a partial update, only touching fields that are `Some`.
    pub fn merge(&mut self, update: &SettingsUpdate) {
        if let Some(ref voice) = update.voice_id {
            self.voice_id.clone_from(voice);
        }
        if let Some(rate) = update.rate {
            self.rate = rate;
        }
        if let Some(pitch) = update.pitch {
            self.pitch = pitch;
        }
        if let Some(gap) = update.segment_gap_ms {
            self.segment_gap_ms = gap;
        }
        if let Some(lookahead) = update.lookahead_secs {
            self.lookahead_secs = lookahead;
        }
        if let Some(granularity) = update.granularity {
            self.granularity = granularity;
        }
        if let Some(backoff) = update.error_backoff_ms {
            self.error_backoff_ms = backoff;
        }
        if let Some(retries) = update.max_lookahead_retries {
            self.max_lookahead_retries = retries;
        }
    }
}

/// Partial settings update.
///
/// `max_lookahead_retries` is `Option<Option<u32>>`:
/// - `None` = don't change this field
/// - `Some(None)` = retry forever
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub voice_id: Option<String>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub segment_gap_ms: Option<u64>,
    pub lookahead_secs: Option<f64>,
    pub granularity: Option<Granularity>,
    pub error_backoff_ms: Option<u64>,
    pub max_lookahead_retries: Option<Option<u32>>,
}

/// Errors from settings validation and persistence.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Playback rate must be a positive number, got {0}")]
    InvalidRate(f32),

    #[error("Pitch must be a positive number, got {0}")]
    InvalidPitch(f32),

    #[error("Lookahead must be a positive number of seconds, got {0}")]
    InvalidLookahead(f64),

    #[error("Voice id must not be empty")]
    EmptyVoice,

    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Validate settings values.
pub fn validate_settings(settings: &NarrationSettings) -> Result<(), SettingsError> {
    if !settings.rate.is_finite() || settings.rate <= 0.0 {
        return Err(SettingsError::InvalidRate(settings.rate));
    }
    if !settings.pitch.is_finite() || settings.pitch <= 0.0 {
        return Err(SettingsError::InvalidPitch(settings.pitch));
    }
    if !settings.lookahead_secs.is_finite() || settings.lookahead_secs <= 0.0 {
        return Err(SettingsError::InvalidLookahead(settings.lookahead_secs));
    }
    if settings.voice_id.trim().is_empty() {
        return Err(SettingsError::EmptyVoice);
    }
    Ok(())
}

// ── Persistence ────────────────────────────────────────────────────

/// Default settings file: `<config_dir>/narrate/settings.json`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("narrate").join("settings.json"))
}

/// Load settings from a JSON file.
///
/// A missing file yields defaults. An unreadable or corrupt file is logged
/// and also yields defaults, so a bad settings file never blocks playback.
pub fn load_settings(path: &Path) -> NarrationSettings {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No settings file, using defaults");
            return NarrationSettings::default();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
            return NarrationSettings::default();
        }
    };

    match serde_json::from_str::<NarrationSettings>(&contents) {
        Ok(settings) => {
            tracing::info!(path = %path.display(), "Loaded settings");
            settings
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to parse settings, using defaults");
            NarrationSettings::default()
        }
    }
}

/// Write settings as pretty JSON, creating parent directories as needed.
pub fn save_settings(path: &Path, settings: &NarrationSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })
}
