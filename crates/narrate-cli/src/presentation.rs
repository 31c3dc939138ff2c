//! Terminal rendering of engine events and segment listings.

use narrate_core::{NarrationEvent, PlaybackStatus};
use narrate_engine::ControllerSnapshot;

/// One human-readable line per event. Positions are shown 1-based.
pub fn describe(event: &NarrationEvent) -> String {
    match event {
        NarrationEvent::StatusChanged { status } => format!("[{}]", status_label(*status)),
        NarrationEvent::PositionChanged(update) => format!(
            "paragraph {}/{}, segment {}/{}",
            update.paragraph + 1,
            update.paragraph_count,
            update.segment + 1,
            update.segment_count
        ),
        NarrationEvent::EndOfContent => "end of text".to_string(),
        NarrationEvent::Error { message } => format!("error: {message}"),
        NarrationEvent::ProviderFallback(notice) => format!(
            "speech provider failed during {} ({}), now using {}",
            notice.operation, notice.error, notice.provider
        ),
    }
}

/// Event as a single JSON line.
pub fn to_json_line(event: &NarrationEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| format!(r#"{{"type":"error","message":"{e}"}}"#))
}

pub fn describe_snapshot(snapshot: &ControllerSnapshot) -> String {
    format!(
        "{} at paragraph {}/{}, segment {}/{}; {:.1}s buffered{}{}",
        status_label(snapshot.status),
        snapshot.position.paragraph + 1,
        snapshot.paragraph_count,
        snapshot.position.segment + 1,
        snapshot.segment_count,
        snapshot.buffered_secs,
        if snapshot.generating { ", generating" } else { "" },
        if snapshot.consecutive_failures > 0 {
            format!(", {} failed attempts", snapshot.consecutive_failures)
        } else {
            String::new()
        },
    )
}

const fn status_label(status: PlaybackStatus) -> &'static str {
    match status {
        PlaybackStatus::Idle => "stopped",
        PlaybackStatus::Loading => "loading",
        PlaybackStatus::Playing => "playing",
        PlaybackStatus::Buffering => "buffering",
        PlaybackStatus::Paused => "paused",
    }
}

/// `[p.s] text` lines for `narrate segments`, 1-based.
pub fn segment_lines(paragraphs: &[Vec<String>]) -> Vec<String> {
    let mut lines = Vec::new();
    for (p, segments) in paragraphs.iter().enumerate() {
        for (s, text) in segments.iter().enumerate() {
            let text = text.replace('\n', " ");
            lines.push(format!("[{}.{}] {text}", p + 1, s + 1));
        }
    }
    lines
}
