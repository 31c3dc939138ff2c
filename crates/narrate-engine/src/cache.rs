//! Per-paragraph store of segment text and generated clips.
//!
//! The controller and the lookahead scheduler both write into one
//! [`ParagraphCache`]. Entries are created lazily the first time a paragraph
//! is referenced and never shrink. A slot, once written, keeps its clip
//! until the entry is dropped by [`ParagraphCache::load`] or
//! [`ParagraphCache::clear`].

use std::sync::Arc;
use std::time::Duration;

use narrate_core::{Clip, GenerationKey, Granularity, Segment};

use crate::segmenter::segment_paragraph;

/// Cached state of one paragraph.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    text: String,
    segments: Vec<String>,
    clips: Vec<Option<Arc<Clip>>>,
    total: Duration,
}

impl CacheEntry {
    fn new(text: &str, granularity: Granularity) -> Self {
        let mut segments = segment_paragraph(text, granularity);
        if segments.is_empty() {
            // Whitespace-only paragraph: still one segment so indices stay valid.
            segments.push(text.trim().to_string());
        }
        let clips = vec![None; segments.len()];
        Self {
            text: text.to_string(),
            segments,
            clips,
            total: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn clip(&self, segment: usize) -> Option<&Arc<Clip>> {
        self.clips.get(segment).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn is_cached(&self, segment: usize) -> bool {
        self.clip(segment).is_some()
    }

    /// Sum of all generated clip durations in this paragraph.
    #[must_use]
    pub const fn total_duration(&self) -> Duration {
        self.total
    }

    #[must_use]
    pub fn is_fully_buffered(&self) -> bool {
        self.clips.iter().all(Option::is_some)
    }

    /// Index of the first segment without a clip.
    #[must_use]
    pub fn first_missing(&self) -> Option<usize> {
        self.clips.iter().position(Option::is_none)
    }

    /// First segment without a clip at or after `segment`.
    #[must_use]
    pub fn first_missing_from(&self, segment: usize) -> Option<usize> {
        self.clips
            .iter()
            .skip(segment)
            .position(Option::is_none)
            .map(|offset| segment + offset)
    }

    /// Duration of the uninterrupted run of clips starting at `segment`.
    ///
    /// Stops at the first gap, even if later segments are cached.
    #[must_use]
    pub fn buffered_from(&self, segment: usize) -> Duration {
        self.clips
            .iter()
            .skip(segment)
            .map_while(|slot| slot.as_ref().map(|clip| clip.duration()))
            .sum()
    }

    fn record(&mut self, segment: usize, clip: Arc<Clip>) -> bool {
        match self.clips.get_mut(segment) {
            Some(slot @ None) => {
                self.total += clip.duration();
                *slot = Some(clip);
                true
            }
            _ => false,
        }
    }
}

/// Cache of paragraphs for the currently loaded content.
#[derive(Debug, Default)]
pub struct ParagraphCache {
    granularity: Granularity,
    paragraphs: Vec<String>,
    entries: Vec<Option<CacheEntry>>,
}

impl ParagraphCache {
    #[must_use]
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            paragraphs: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Replace the loaded paragraphs.
    ///
    /// Entries whose paragraph text is unchanged at the same index are kept
    /// so already generated audio is reused; everything else is dropped. A
    /// granularity change drops every entry. Returns the number of entries
    /// kept.
    pub fn load(&mut self, paragraphs: Vec<String>, granularity: Granularity) -> usize {
        let mut previous = std::mem::take(&mut self.entries);
        if granularity != self.granularity {
            previous.clear();
        }

        self.entries = paragraphs
            .iter()
            .enumerate()
            .map(|(index, text)| {
                previous
                    .get_mut(index)
                    .and_then(Option::take)
                    .filter(|entry| entry.text == *text)
            })
            .collect();

        self.granularity = granularity;
        self.paragraphs = paragraphs;
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    /// Drop every generated clip, keeping the loaded paragraphs.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
    }

    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        self.granularity
    }

    #[must_use]
    pub fn paragraph_count(&self) -> usize {
        self.paragraphs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    #[must_use]
    pub fn paragraph(&self, index: usize) -> Option<&str> {
        self.paragraphs.get(index).map(String::as_str)
    }

    /// Entry for `paragraph`, creating it on first reference.
    ///
    /// `None` only when the index is past the loaded content.
    pub fn get_or_create(&mut self, paragraph: usize) -> Option<&CacheEntry> {
        self.entry_mut(paragraph).map(|entry| &*entry)
    }

    /// Existing entry, without creating one.
    #[must_use]
    pub fn entry(&self, paragraph: usize) -> Option<&CacheEntry> {
        self.entries.get(paragraph).and_then(Option::as_ref)
    }

    pub fn segment_count(&mut self, paragraph: usize) -> usize {
        self.get_or_create(paragraph)
            .map_or(0, CacheEntry::segment_count)
    }

    /// Segment addressed by `key`, with its text.
    pub fn segment(&mut self, key: GenerationKey) -> Option<Segment> {
        let entry = self.get_or_create(key.paragraph)?;
        let text = entry.segments.get(key.segment)?.clone();
        Some(Segment {
            paragraph_index: key.paragraph,
            segment_index: key.segment,
            text,
        })
    }

    #[must_use]
    pub fn clip(&self, key: GenerationKey) -> Option<Arc<Clip>> {
        self.entry(key.paragraph)
            .and_then(|entry| entry.clip(key.segment))
            .cloned()
    }

    /// Store a generated clip.
    ///
    /// Returns `false` and leaves the cache untouched when the slot is
    /// already filled or does not exist.
    pub fn record_clip(&mut self, key: GenerationKey, clip: Arc<Clip>) -> bool {
        self.entry_mut(key.paragraph)
            .is_some_and(|entry| entry.record(key.segment, clip))
    }

    /// Contiguous playable audio starting at `(paragraph, segment)`.
    ///
    /// Zero when the paragraph has no entry or the starting slot is empty.
    #[must_use]
    pub fn buffered_duration_from(&self, paragraph: usize, segment: usize) -> Duration {
        self.entry(paragraph)
            .map_or(Duration::ZERO, |entry| entry.buffered_from(segment))
    }

    /// Total generated audio in `paragraph`, gaps included.
    #[must_use]
    pub fn total_buffered(&self, paragraph: usize) -> Duration {
        self.entry(paragraph)
            .map_or(Duration::ZERO, CacheEntry::total_duration)
    }

    #[must_use]
    pub fn is_fully_buffered(&self, paragraph: usize) -> bool {
        self.entry(paragraph)
            .is_some_and(CacheEntry::is_fully_buffered)
    }

    /// First ungenerated segment of `paragraph`, creating its entry.
    pub fn first_missing(&mut self, paragraph: usize) -> Option<usize> {
        self.get_or_create(paragraph)
            .and_then(CacheEntry::first_missing)
    }

    pub fn first_missing_from(&mut self, paragraph: usize, segment: usize) -> Option<usize> {
        self.get_or_create(paragraph)
            .and_then(|entry| entry.first_missing_from(segment))
    }

    fn entry_mut(&mut self, paragraph: usize) -> Option<&mut CacheEntry> {
        let text = self.paragraphs.get(paragraph)?;
        let granularity = self.granularity;
        let slot = self.entries.get_mut(paragraph)?;
        Some(slot.get_or_insert_with(|| CacheEntry::new(text, granularity)))
    }
}
