//! On-disk naming contract for intermediate and chapter files.
//!
//! Segment outputs are named `chapter-NNNN-part-NNNN.<ext>`. Both numbers are
//! zero-padded to four digits, so lexical order of the names equals
//! `(chapter, sequence)` order and a directory listing is enough to rebuild
//! every chapter.

use crate::error::{BindError, Result};
use std::path::Path;

/// Largest chapter index or sequence number the names can carry.
pub const MAX_INDEX: usize = 9999;

/// Fail if `index` does not fit the four-digit naming contract.
pub fn check_index(what: &str, index: usize) -> Result<()> {
    if index > MAX_INDEX {
        return Err(BindError::configuration(format!(
            "{} index {} exceeds the limit of {}",
            what, index, MAX_INDEX
        )));
    }
    Ok(())
}

pub fn segment_file_name(chapter: usize, sequence: usize, ext: &str) -> String {
    format!("chapter-{:04}-part-{:04}.{}", chapter, sequence, ext)
}

fn four_digits(s: &str) -> Option<usize> {
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

/// Recover `(chapter, sequence)` from a segment file name.
pub fn parse_segment_file_name(name: &str) -> Option<(usize, usize)> {
    let rest = name.strip_prefix("chapter-")?;
    let chapter = four_digits(rest.get(..4)?)?;
    let rest = rest.get(4..)?.strip_prefix("-part-")?;
    let sequence = four_digits(rest.get(..4)?)?;
    let ext = rest.get(4..)?.strip_prefix('.')?;
    if ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some((chapter, sequence))
}

pub fn is_segment_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_segment_file_name)
        .is_some()
}

/// Name of a reconstructed chapter file: `NNNN-<stem>.<ext>`.
pub fn chapter_file_name(index: usize, stem: &str, ext: &str) -> String {
    format!("{:04}-{}.{}", index, stem, ext)
}

/// Chapter title from a chapter file's base name, without the ordering prefix.
pub fn chapter_title(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match stem.split_once('-') {
        Some((prefix, title)) if four_digits(prefix).is_some() => title.to_string(),
        _ => stem,
    }
}
