//! Shared fixtures for integration tests.
//!
//! External tools are stood in for by `sh` one-liners so the pipeline can be
//! exercised without ffmpeg.

#![allow(dead_code)]

use audiobinder_av::{AlbumMetadata, ToolCommand, Toolchain};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Toolchain whose operations are plain file copies and concatenations.
///
/// A split writes the source followed by a line holding the segment start in
/// whole seconds, so the order of reassembled parts is visible in the bytes.
pub struct ShellToolchain;

fn sh(script: &str) -> ToolCommand {
    ToolCommand::new("sh").arg("-c").arg(script)
}

impl Toolchain for ShellToolchain {
    fn encoded_extension(&self) -> &str {
        "m4a"
    }

    fn split_segment(
        &self,
        source: &Path,
        start: Duration,
        _length: Option<Duration>,
        output: &Path,
    ) -> ToolCommand {
        sh(r#"cat "$0" > "$1" && echo "$2" >> "$1""#)
            .path_arg(source)
            .path_arg(output)
            .arg(start.as_secs().to_string())
    }

    fn transcode_segment(&self, source: &Path, _bitrate_kbps: u32, output: &Path) -> ToolCommand {
        sh(r#"cp "$0" "$1""#).path_arg(source).path_arg(output)
    }

    fn concat(
        &self,
        inputs: &[PathBuf],
        _list_file: &Path,
        output: &Path,
        _track: Option<usize>,
    ) -> audiobinder_av::Result<ToolCommand> {
        let mut cmd = sh(r#"cat "$@" > "$0""#).path_arg(output);
        for input in inputs {
            cmd = cmd.path_arg(input);
        }
        Ok(cmd)
    }

    fn embed(
        &self,
        input: &Path,
        _chapters: Option<&Path>,
        _metadata: &AlbumMetadata,
        output: &Path,
    ) -> ToolCommand {
        sh(r#"cp "$0" "$1""#).path_arg(input).path_arg(output)
    }
}

/// Write an executable stand-in for ffprobe that reports the same format
/// block for every file.
#[cfg(unix)]
pub fn fake_ffprobe(dir: &Path, duration_secs: f64, album: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ffprobe");
    let json = format!(
        r#"{{"format":{{"duration":"{:.6}","bit_rate":"64000","tags":{{"ALBUM":"{}","ARTIST":"Test Reader","DATE":"2001"}}}}}}"#,
        duration_secs, album
    );
    std::fs::write(&path, format!("#!/bin/sh\necho '{}'\n", json)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Like [`fake_ffprobe`], but each call appends `+` on entry and `-` on exit
/// to `log` and sleeps in between, so overlapping calls can be counted.
#[cfg(unix)]
pub fn logging_ffprobe(dir: &Path, log: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("logging-ffprobe");
    let json = r#"{"format":{"duration":"5.000000","tags":{}}}"#;
    let script = format!(
        "#!/bin/sh\necho + >> '{log}'\nsleep 0.2\necho - >> '{log}'\necho '{json}'\n",
        log = log.display(),
        json = json
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Highest number of overlapping calls recorded by [`logging_ffprobe`].
pub fn max_overlap(log: &str) -> usize {
    let mut current = 0usize;
    let mut max = 0;
    for line in log.lines() {
        match line.trim() {
            "+" => {
                current += 1;
                max = max.max(current);
            }
            "-" => current = current.saturating_sub(1),
            _ => {}
        }
    }
    max
}

/// A reference CUE sheet with two chapters.
pub const TWO_CHAPTER_CUE: &str = "TRACK 01 AUDIO\n  TITLE \"Intro\"\n  INDEX 01 00:00:00\nTRACK 02 AUDIO\n  TITLE \"Chapter One\"\n  INDEX 01 03:30:00\n";

/// Deterministic pseudo-random sequence (64-bit LCG).
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn below(&mut self, n: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % n
    }
}
