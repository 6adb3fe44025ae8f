//! The closed set of source audio container types.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Audio container formats accepted as binder input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AudioFormat {
    Mp3,
    M4b,
    M4a,
    Wav,
    Ogg,
    Flac,
    Aac,
}

impl AudioFormat {
    /// All formats, in tie-break priority order.
    pub const ALL: [AudioFormat; 7] = [
        AudioFormat::Mp3,
        AudioFormat::M4b,
        AudioFormat::M4a,
        AudioFormat::Wav,
        AudioFormat::Ogg,
        AudioFormat::Flac,
        AudioFormat::Aac,
    ];

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4b => "m4b",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
            AudioFormat::Aac => "aac",
        }
    }

    /// Detect the format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }

    /// MP4-family containers already holding AAC audio; these can be
    /// concatenated with stream copy instead of being transcoded.
    pub fn is_aac_container(&self) -> bool {
        matches!(self, AudioFormat::M4b | AudioFormat::M4a)
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "m4b" => Ok(AudioFormat::M4b),
            "m4a" => Ok(AudioFormat::M4a),
            "wav" => Ok(AudioFormat::Wav),
            "ogg" => Ok(AudioFormat::Ogg),
            "flac" => Ok(AudioFormat::Flac),
            "aac" => Ok(AudioFormat::Aac),
            _ => Err(format!("Unsupported audio format: {}", s)),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
