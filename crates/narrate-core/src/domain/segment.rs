//! Segments, playback positions and generation keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unit of text scheduled for narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One segment per sentence. Playback starts after the first sentence
    /// is generated.
    #[default]
    Sentence,

    /// One segment per paragraph.
    Paragraph,
}

impl Granularity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sentence => "sentence",
            Self::Paragraph => "paragraph",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentence" | "sentences" => Ok(Self::Sentence),
            "paragraph" | "paragraphs" => Ok(Self::Paragraph),
            other => Err(format!(
                "unknown granularity '{other}' (expected 'sentence' or 'paragraph')"
            )),
        }
    }
}

/// An ordered unit of narratable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Index of the paragraph this segment belongs to.
    pub paragraph_index: usize,
    /// Index of the segment within its paragraph.
    pub segment_index: usize,
    /// Text to synthesize.
    pub text: String,
}

/// The play head: which segment is playing, or plays next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub paragraph: usize,
    pub segment: usize,
}

impl PlaybackPosition {
    /// The start of the content.
    pub const START: Self = Self::new(0, 0);

    #[must_use]
    pub const fn new(paragraph: usize, segment: usize) -> Self {
        Self { paragraph, segment }
    }

    /// First segment of the given paragraph.
    #[must_use]
    pub const fn paragraph_start(paragraph: usize) -> Self {
        Self::new(paragraph, 0)
    }
}

impl fmt::Display for PlaybackPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.paragraph, self.segment)
    }
}

/// Identifies one generation request.
///
/// At most one key is in flight at a time; that is what keeps cache writes
/// single-writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationKey {
    pub paragraph: usize,
    pub segment: usize,
}

impl GenerationKey {
    #[must_use]
    pub const fn new(paragraph: usize, segment: usize) -> Self {
        Self { paragraph, segment }
    }
}

impl From<PlaybackPosition> for GenerationKey {
    fn from(position: PlaybackPosition) -> Self {
        Self::new(position.paragraph, position.segment)
    }
}

impl fmt::Display for GenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.paragraph, self.segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_parses_both_spellings() {
        assert_eq!("sentence".parse::<Granularity>(), Ok(Granularity::Sentence));
        assert_eq!("Paragraphs".parse::<Granularity>(), Ok(Granularity::Paragraph));
        assert!("word".parse::<Granularity>().is_err());
    }

    #[test]
    fn granularity_serializes_lowercase() {
        let json = serde_json::to_string(&Granularity::Paragraph).unwrap();
        assert_eq!(json, "\"paragraph\"");
    }

    #[test]
    fn positions_order_by_paragraph_then_segment() {
        assert!(PlaybackPosition::new(0, 5) < PlaybackPosition::new(1, 0));
        assert!(PlaybackPosition::new(2, 1) < PlaybackPosition::new(2, 3));
        assert_eq!(PlaybackPosition::START, PlaybackPosition::default());
    }

    #[test]
    fn key_from_position() {
        let key = GenerationKey::from(PlaybackPosition::new(3, 2));
        assert_eq!(key, GenerationKey::new(3, 2));
        assert_eq!(key.to_string(), "3:2");
    }
}
