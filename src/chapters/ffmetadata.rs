//! FFMETADATA1 chapter documents.

use super::Chapter;
use crate::error::Result;
use std::fmt::Write;
use std::path::Path;

/// Escape the characters ffmpeg treats specially in metadata values.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn render_ffmetadata(chapters: &[Chapter]) -> String {
    let mut doc = String::from(";FFMETADATA1\n\n");
    for chapter in chapters {
        let _ = write!(
            doc,
            "[CHAPTER]\nTIMEBASE=1/10\nSTART={}\nEND={}\ntitle={}\n\n",
            chapter.start,
            chapter.end,
            escape(&chapter.title)
        );
    }
    doc
}

pub fn write_ffmetadata(path: &Path, chapters: &[Chapter]) -> Result<()> {
    std::fs::write(path, render_ffmetadata(chapters))?;
    Ok(())
}
