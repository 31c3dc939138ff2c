//! Text segmentation for narration.
//!
//! Splits article text into paragraphs, and paragraphs into sentence-sized
//! segments that a speech backend can synthesize one at a time.
//!
//! Sentence boundaries follow Unicode text segmentation (UAX #29), which
//! already copes with closing quotes, brackets and lowercase continuations
//! such as "e.g. the". On top of that a short list of title and reference
//! abbreviations ("Dr.", "St.", "Fig.") is never treated as a sentence end,
//! because UAX #29 breaks before any following capital letter.

use narrate_core::Granularity;
use unicode_segmentation::UnicodeSegmentation;

/// Abbreviations that do not end a sentence even when followed by a capital.
///
/// Matched case-insensitively against the last word of a candidate sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "st.", "mt.", "vs.", "fig.",
    "approx.", "gen.", "gov.", "sen.", "rep.", "capt.", "col.", "lt.", "sgt.", "e.g.", "i.e.",
];

/// Split text into paragraphs at blank lines.
///
/// Lines inside a paragraph keep their line breaks; each paragraph is
/// trimmed and empty paragraphs are dropped.
#[must_use]
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);

    paragraphs
}

/// Split a paragraph into sentences.
///
/// Never returns an empty list for input with any non-whitespace text: if
/// no boundary is found the whole trimmed paragraph is the only sentence.
/// Joining the result with single spaces gives back the paragraph up to
/// whitespace at the boundaries.
#[must_use]
pub fn split_sentences(paragraph: &str) -> Vec<String> {
    let trimmed = paragraph.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut sentences: Vec<String> = Vec::new();
    let mut carry = String::new();

    for piece in trimmed.split_sentence_bounds() {
        carry.push_str(piece);
        if ends_with_abbreviation(&carry) {
            continue;
        }
        let sentence = carry.trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        carry.clear();
    }

    // Trailing abbreviation ("... in the U.S. vs.") closes the paragraph.
    let rest = carry.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    if sentences.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

/// Segments of a paragraph at the given granularity.
#[must_use]
pub fn segment_paragraph(paragraph: &str, granularity: Granularity) -> Vec<String> {
    match granularity {
        Granularity::Sentence => split_sentences(paragraph),
        Granularity::Paragraph => {
            let trimmed = paragraph.trim();
            if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![trimmed.to_string()]
            }
        }
    }
}

// ── Internal helpers ───────────────────────────────────────────────

fn flush_paragraph(lines: &mut Vec<&str>, out: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let paragraph = lines.join("\n");
    let paragraph = paragraph.trim();
    if !paragraph.is_empty() {
        out.push(paragraph.to_string());
    }
    lines.clear();
}

fn ends_with_abbreviation(candidate: &str) -> bool {
    candidate
        .split_whitespace()
        .next_back()
        .is_some_and(|word| {
            let word = word.trim_start_matches(['(', '"', '\'', '“', '‘']);
            ABBREVIATIONS
                .iter()
                .any(|abbr| word.eq_ignore_ascii_case(abbr))
        })
}
