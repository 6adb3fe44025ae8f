//! Concat demuxer list files.

use crate::{Error, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Quote a path for a concat list `file` directive.
///
/// Single quotes end the quoted string, so each one is written as `'\''`.
pub fn escape_concat_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Write a concat list naming `inputs` in order.
pub fn write_concat_list(list_file: &Path, inputs: &[PathBuf]) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::InvalidInput("nothing to concatenate".to_string()));
    }
    let mut content = String::new();
    for input in inputs {
        let _ = writeln!(content, "file {}", escape_concat_path(input));
    }
    std::fs::write(list_file, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_escape_plain_path() {
        assert_eq!(
            escape_concat_path(Path::new("/tmp/a/chapter-0000-part-0001.m4a")),
            "'/tmp/a/chapter-0000-part-0001.m4a'"
        );
    }

    #[test]
    fn test_escape_single_quote() {
        assert_eq!(
            escape_concat_path(Path::new("/books/Ender's Game/01.mp3")),
            r"'/books/Ender'\''s Game/01.mp3'"
        );
    }

    #[test]
    fn test_write_concat_list_preserves_order() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("list.txt");
        let inputs = vec![PathBuf::from("/x/b.m4a"), PathBuf::from("/x/a.m4a")];

        write_concat_list(&list, &inputs).unwrap();

        let content = std::fs::read_to_string(&list).unwrap();
        assert_eq!(content, "file '/x/b.m4a'\nfile '/x/a.m4a'\n");
    }
}
