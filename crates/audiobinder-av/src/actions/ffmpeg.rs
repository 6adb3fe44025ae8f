//! ffmpeg-backed toolchain.

use super::{write_concat_list, Toolchain};
use crate::{AlbumMetadata, Result, ToolCommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Invocations built for the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    ffmpeg: PathBuf,
}

impl FfmpegToolchain {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    fn base(&self) -> ToolCommand {
        ToolCommand::new(&self.ffmpeg).args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"])
    }
}

fn seconds(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

impl Toolchain for FfmpegToolchain {
    fn encoded_extension(&self) -> &str {
        "m4a"
    }

    fn split_segment(
        &self,
        source: &Path,
        start: Duration,
        length: Option<Duration>,
        output: &Path,
    ) -> ToolCommand {
        let mut cmd = self.base().arg("-ss").arg(seconds(start)).arg("-i").path_arg(source);
        if let Some(length) = length {
            cmd = cmd.arg("-t").arg(seconds(length));
        }
        cmd.args(["-map", "0:a", "-c", "copy"]).path_arg(output)
    }

    fn transcode_segment(&self, source: &Path, bitrate_kbps: u32, output: &Path) -> ToolCommand {
        // Cover art arrives as a video stream; drop it.
        self.base()
            .arg("-i")
            .path_arg(source)
            .args(["-vn", "-map", "0:a", "-c:a", "aac", "-b:a"])
            .arg(format!("{}k", bitrate_kbps))
            .args(["-movflags", "+faststart"])
            .path_arg(output)
    }

    fn concat(
        &self,
        inputs: &[PathBuf],
        list_file: &Path,
        output: &Path,
        track: Option<usize>,
    ) -> Result<ToolCommand> {
        write_concat_list(list_file, inputs)?;

        let mut cmd = self
            .base()
            .args(["-f", "concat", "-safe", "0", "-i"])
            .path_arg(list_file)
            .args(["-map", "0:a", "-c", "copy"]);
        if let Some(track) = track {
            cmd = cmd.arg("-metadata").arg(format!("track={}", track));
        }
        Ok(cmd.path_arg(output))
    }

    fn embed(
        &self,
        input: &Path,
        chapters: Option<&Path>,
        metadata: &AlbumMetadata,
        output: &Path,
    ) -> ToolCommand {
        let mut cmd = self.base().arg("-i").path_arg(input);
        if let Some(chapters) = chapters {
            cmd = cmd.arg("-i").path_arg(chapters);
        }
        cmd = cmd.args(["-map", "0:a", "-c", "copy"]);
        if chapters.is_some() {
            cmd = cmd.args(["-map_chapters", "1"]);
        }
        cmd.arg("-metadata")
            .arg(format!("artist={}", metadata.artist))
            .arg("-metadata")
            .arg(format!("album={}", metadata.album))
            .arg("-metadata")
            .arg(format!("date={}", metadata.date))
            .path_arg(output)
    }
}
