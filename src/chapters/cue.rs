//! Lenient CUE sheet reader.
//!
//! Only `TRACK`, `TITLE` and `INDEX` lines are interpreted. Anything else,
//! including malformed instances of those three, is skipped without error.

use super::{Chapter, TICKS_PER_SECOND};
use crate::error::Result;
use std::path::Path;
use std::time::Duration;

/// CD frames per second in `MM:SS:FF` timestamps.
pub const FRAMES_PER_SECOND: u64 = 75;

/// One `TRACK` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueTrack {
    pub title: Option<String>,
    /// Start offset in ticks, from the first `INDEX` line of the record.
    pub start: Option<u64>,
}

/// Parse `MM:SS:FF` into ticks.
fn parse_timestamp(s: &str) -> Option<u64> {
    let mut parts = s.split(':');
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    let frames: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let whole = minutes
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_mul(TICKS_PER_SECOND)?;
    whole.checked_add(frames.checked_mul(TICKS_PER_SECOND)? / FRAMES_PER_SECOND)
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    let s = s.strip_prefix('"').unwrap_or(s);
    s.strip_suffix('"').unwrap_or(s)
}

/// Collect the track records of a CUE sheet in file order.
pub fn parse_cue(text: &str) -> Vec<CueTrack> {
    let mut tracks: Vec<CueTrack> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        let Some(keyword) = line.split_whitespace().next() else {
            continue;
        };

        match keyword.to_ascii_uppercase().as_str() {
            "TRACK" => tracks.push(CueTrack {
                title: None,
                start: None,
            }),
            "TITLE" => {
                if let Some(track) = tracks.last_mut() {
                    let value = unquote(&line[keyword.len()..]);
                    if !value.is_empty() {
                        track.title = Some(value.to_string());
                    }
                }
            }
            "INDEX" => {
                let Some(track) = tracks.last_mut() else {
                    continue;
                };
                if track.start.is_some() {
                    continue;
                }
                track.start = line.split_whitespace().nth(2).and_then(parse_timestamp);
            }
            _ => {}
        }
    }

    tracks
}

/// Chapters for a CUE sheet describing `total` seconds of audio.
///
/// Each chapter ends where the next begins; the last ends at `total`.
/// Tracks without a usable `INDEX` are dropped. Untitled tracks are named
/// `Chapter N` by their position.
pub fn chapters_from_cue(text: &str, total: Duration) -> Vec<Chapter> {
    let starts: Vec<(String, u64)> = parse_cue(text)
        .into_iter()
        .filter_map(|t| t.start.map(|start| (t.title, start)))
        .enumerate()
        .map(|(i, (title, start))| (title.unwrap_or_else(|| format!("Chapter {}", i + 1)), start))
        .collect();

    let total_ticks = super::to_ticks(total);
    let mut chapters = Vec::with_capacity(starts.len());
    for (i, (title, start)) in starts.iter().enumerate() {
        let end = match starts.get(i + 1) {
            Some((_, next)) => *next,
            None => total_ticks.max(*start),
        };
        chapters.push(Chapter::new(title.clone(), *start, end));
    }
    chapters
}

/// Read a CUE sheet, tolerating a byte-order mark and invalid UTF-8.
pub fn read_cue_sheet(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "TRACK 01 AUDIO\n  TITLE \"Intro\"\n  INDEX 01 00:00:00\nTRACK 02 AUDIO\n  TITLE \"Chapter One\"\n  INDEX 01 03:30:00\n";

    #[test]
    fn test_reference_sheet() {
        let chapters = chapters_from_cue(SHEET, Duration::from_secs_f64(600.0));
        assert_eq!(
            chapters,
            vec![
                Chapter::new("Intro", 0, 2100),
                Chapter::new("Chapter One", 2100, 6000),
            ]
        );
    }

    #[test]
    fn test_frames_convert_at_75_per_second() {
        assert_eq!(parse_timestamp("00:01:00"), Some(10));
        assert_eq!(parse_timestamp("00:00:74"), Some(9));
        assert_eq!(parse_timestamp("01:02:30"), Some(624));
        assert_eq!(parse_timestamp("1:2"), None);
        assert_eq!(parse_timestamp("aa:00:00"), None);
    }

    #[test]
    fn test_oversized_timestamp_is_skipped() {
        assert_eq!(parse_timestamp("999999999999999999:00:00"), None);
        assert_eq!(parse_timestamp("00:00:18446744073709551615"), None);

        let sheet = "TRACK 01 AUDIO\n  TITLE \"A\"\n  INDEX 01 999999999999999999:00:00\n\
            TRACK 02 AUDIO\n  TITLE \"B\"\n  INDEX 01 00:01:00\n";
        let chapters = chapters_from_cue(sheet, Duration::from_secs(600));
        assert_eq!(chapters, vec![Chapter::new("B", 10, 6000)]);
    }

    #[test]
    fn test_first_index_wins() {
        let sheet = "TRACK 01 AUDIO\nTITLE \"A\"\nINDEX 00 00:10:00\nINDEX 01 00:12:00\n";
        let tracks = parse_cue(sheet);
        assert_eq!(tracks[0].start, Some(100));
    }

    #[test]
    fn test_malformed_lines_are_ignored() {
        let sheet = "\u{FEFF}REM GENRE Audiobook\nPERFORMER \"Someone\"\nTITLE \"Disc\"\nFILE \"book.mp3\" MP3\n\
            TRACK 01 AUDIO\n  TITLE\n  INDEX 01 garbage\n  INDEX 01 00:00:00\n\
            TRACK 02 AUDIO\n  TITLE \"No index\"\n\
            TRACK 03 AUDIO\n  title \"Last\"\n  index 01 00:05:00\n";
        let chapters = chapters_from_cue(sheet, Duration::from_secs(20));

        assert_eq!(
            chapters,
            vec![Chapter::new("Chapter 1", 0, 50), Chapter::new("Last", 50, 200)]
        );
    }

    #[test]
    fn test_empty_sheet() {
        assert!(chapters_from_cue("", Duration::from_secs(10)).is_empty());
        assert!(parse_cue("INDEX 01 00:00:00\nTITLE \"orphan\"").is_empty());
    }

    #[test]
    fn test_read_cue_sheet_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cue");
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(SHEET.as_bytes());
        std::fs::write(&path, bytes).unwrap();

        let text = read_cue_sheet(&path).unwrap();
        assert!(text.starts_with("TRACK"));
    }
}
