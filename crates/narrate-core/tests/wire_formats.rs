//! Integration tests for the JSON shapes adapters exchange with the engine.
//!
//! Settings files are written by hand and events are forwarded to other
//! processes, so both formats are checked from outside the crate.

use narrate_core::{
    Granularity, NarrationEvent, NarrationSettings, PlaybackStatus, SettingsUpdate,
    validate_settings,
};

#[test]
fn test_partial_settings_file_fills_defaults() {
    let settings: NarrationSettings =
        serde_json::from_str(r#"{ "voice_id": "nova", "granularity": "paragraph" }"#).unwrap();

    assert_eq!(settings.voice_id, "nova");
    assert_eq!(settings.granularity, Granularity::Paragraph);
    assert!((settings.rate - 1.0).abs() < f32::EPSILON);
    assert_eq!(settings.max_lookahead_retries, Some(8));
    assert!(validate_settings(&settings).is_ok());
}

#[test]
fn test_unbounded_retries_round_trip_as_null() {
    let settings = NarrationSettings {
        max_lookahead_retries: None,
        ..NarrationSettings::default()
    };
    let json = serde_json::to_value(&settings).unwrap();
    assert!(json["max_lookahead_retries"].is_null());

    let back: NarrationSettings = serde_json::from_value(json).unwrap();
    assert_eq!(back.max_lookahead_retries, None);
}

#[test]
fn test_settings_update_from_json() {
    let update: SettingsUpdate = serde_json::from_str(r#"{ "rate": 1.5 }"#).unwrap();
    let mut settings = NarrationSettings::default();
    settings.merge(&update);

    assert!((settings.rate - 1.5).abs() < f32::EPSILON);
    assert_eq!(settings.voice_id, NarrationSettings::default().voice_id);
}

#[test]
fn test_events_parse_from_forwarded_json() {
    let lines = [
        r#"{"type":"status_changed","status":"loading"}"#,
        r#"{"type":"position_changed","paragraph":1,"segment":0,"paragraphCount":3,"segmentCount":2}"#,
        r#"{"type":"error","message":"Speech backend failed: boom"}"#,
        r#"{"type":"end_of_content"}"#,
    ];
    let events: Vec<NarrationEvent> = lines
        .iter()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(
        events[0],
        NarrationEvent::StatusChanged {
            status: PlaybackStatus::Loading
        }
    );
    assert!(matches!(&events[1], NarrationEvent::PositionChanged(update) if update.paragraph_count == 3));
    assert!(matches!(&events[2], NarrationEvent::Error { message } if message.ends_with("boom")));
    assert_eq!(events[3], NarrationEvent::EndOfContent);
}
