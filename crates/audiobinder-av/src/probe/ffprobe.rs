//! FFprobe-based audio probing.

use super::types::*;
use crate::registry::{ProcessRegistry, Scope};
use crate::tools::ToolPaths;
use crate::{Error, Result, ToolCommand};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Build the ffprobe invocation for one file.
pub fn ffprobe_command(ffprobe: &Path, path: &Path) -> ToolCommand {
    ToolCommand::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .path_arg(path)
}

/// Probe an audio file using ffprobe.
pub async fn probe_audio(
    tools: &ToolPaths,
    registry: &ProcessRegistry,
    path: &Path,
) -> Result<AudioProbe> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }

    let output = ffprobe_command(&tools.ffprobe, path)
        .run(registry, &Scope::root())
        .await?;

    parse_ffprobe_output(&output.stdout)
}

/// Parse ffprobe's JSON `-show_format` output.
pub fn parse_ffprobe_output(json_str: &str) -> Result<AudioProbe> {
    let ff_output: FfprobeOutput = serde_json::from_str(json_str)
        .map_err(|e| Error::parse_error("ffprobe", e.to_string()))?;
    let format = ff_output.format;

    let duration = format
        .duration
        .and_then(|s| s.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

    let bit_rate = format.bit_rate.and_then(|s| s.trim().parse::<u64>().ok());

    // Tag key case differs between containers (ID3 vs. MP4 vs. Vorbis).
    let tags: HashMap<String, String> = format
        .tags
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    Ok(AudioProbe {
        duration,
        bit_rate,
        tags: AudioTags {
            artist: tags.get("artist").cloned(),
            album: tags.get("album").cloned(),
            date: tags.get("date").cloned(),
            track: tags.get("track").cloned(),
        },
    })
}
