//! Segments command handler.
//!
//! Shows how a file is split before narration, which is the quickest way to
//! check why a sentence was cut in an odd place.

use anyhow::Result;
use narrate_core::Granularity;
use narrate_engine::{segment_paragraph, split_paragraphs};

use crate::commands::SegmentsArgs;
use crate::error::CliError;
use crate::presentation::segment_lines;

/// Execute the segments command.
pub fn execute(args: &SegmentsArgs) -> Result<()> {
    let text =
        std::fs::read_to_string(&args.file).map_err(|e| CliError::read_file(&args.file, &e))?;
    let paragraphs = segment_text(&text, args.granularity);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paragraphs)?);
    } else {
        for line in segment_lines(&paragraphs) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Segments of every paragraph, in reading order.
pub fn segment_text(text: &str, granularity: Granularity) -> Vec<Vec<String>> {
    split_paragraphs(text)
        .iter()
        .map(|paragraph| segment_paragraph(paragraph, granularity))
        .collect()
}
