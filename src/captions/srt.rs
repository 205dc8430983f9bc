use std::path::Path;

use anyhow::Context as _;

use crate::{
    captions::timing::CaptionChunk,
    error::{ReelError, ReelResult},
};

/// Render caption chunks as a sequential-number subtitle file.
///
/// Each entry is: 1-based index, `HH:MM:SS,mmm --> HH:MM:SS,mmm`, the
/// uppercased chunk text, then a blank line. Milliseconds are truncated, not
/// rounded, so a chunk's printed end never exceeds its real end.
pub fn render_srt(chunks: &[CaptionChunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        out.push_str(&format!("{}\n", i + 1));
        out.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(chunk.start),
            format_timestamp(chunk.end)
        ));
        out.push_str(&chunk.text.to_uppercase());
        out.push_str("\n\n");
    }
    out
}

pub fn write_srt(chunks: &[CaptionChunk], path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create subtitle directory '{}'", parent.display()))?;
    }
    std::fs::write(path, render_srt(chunks))
        .with_context(|| format!("write subtitle file '{}'", path.display()))?;
    Ok(())
}

/// Parse a sequential-number subtitle file back into chunks. Entry indices are
/// ignored; order in the file wins.
pub fn parse_srt(content: &str) -> ReelResult<Vec<CaptionChunk>> {
    let mut chunks = Vec::new();
    let mut lines = content.lines().peekable();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Sequence number line.
        line.parse::<u64>()
            .map_err(|_| ReelError::serde(format!("expected subtitle index, got '{line}'")))?;

        let timing = lines
            .next()
            .ok_or_else(|| ReelError::serde("subtitle entry missing timing line"))?;
        let (start_str, end_str) = timing
            .split_once(" --> ")
            .ok_or_else(|| ReelError::serde(format!("bad timing line '{timing}'")))?;
        let start = parse_timestamp(start_str.trim())?;
        let end = parse_timestamp(end_str.trim())?;

        let mut text = String::new();
        for text_line in lines.by_ref() {
            if text_line.trim().is_empty() {
                break;
            }
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(text_line.trim());
        }
        if text.is_empty() {
            return Err(ReelError::serde("subtitle entry has no text"));
        }
        chunks.push(CaptionChunk { text, start, end });
    }

    Ok(chunks)
}

fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let whole = seconds as u64;
    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let secs = whole % 60;
    let millis = (seconds.fract() * 1000.0) as u64;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

fn parse_timestamp(s: &str) -> ReelResult<f64> {
    let bad = || ReelError::serde(format!("bad subtitle timestamp '{s}'"));
    let (hms, millis) = s.split_once(',').ok_or_else(bad)?;
    let mut parts = hms.split(':');
    let hours: f64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let minutes: f64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let secs: f64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    if parts.next().is_some() {
        return Err(bad());
    }
    let millis: f64 = millis.parse().map_err(|_| bad())?;
    Ok(hours * 3600.0 + minutes * 60.0 + secs + millis / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, start: f64, end: f64) -> CaptionChunk {
        CaptionChunk {
            text: text.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn renders_numbered_entries_with_uppercase_text() {
        let srt = render_srt(&[chunk("hello there", 0.0, 0.85), chunk("big world", 0.85, 2.0)]);
        let expected = "1\n00:00:00,000 --> 00:00:00,850\nHELLO THERE\n\n\
                        2\n00:00:00,850 --> 00:00:02,000\nBIG WORLD\n\n";
        assert_eq!(srt, expected);
    }

    #[test]
    fn milliseconds_are_truncated_not_rounded() {
        assert_eq!(format_timestamp(1.9999), "00:00:01,999");
        assert_eq!(format_timestamp(3661.5), "01:01:01,500");
    }

    #[test]
    fn parse_inverts_render() {
        let original = vec![chunk("FIRST BIT", 0.0, 1.25), chunk("SECOND BIT", 1.25, 3.0)];
        let parsed = parse_srt(&render_srt(&original)).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].text, "FIRST BIT");
        assert!((parsed[1].start - 1.25).abs() < 1e-9);
        assert!((parsed[1].end - 3.0).abs() < 1e-9);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_srt("not a number\n00:00:00,000 --> 00:00:01,000\nX\n\n").is_err());
        assert!(parse_srt("1\nno arrow here\nX\n\n").is_err());
        assert!(parse_srt("1\n00:00:00,000 --> 00:00:01,000\n\n").is_err());
    }
}
