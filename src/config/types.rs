use audiobinder_av::metadata::DEFAULT_BITRATE_KBPS;
use crate::error::{BindError, Result};
use audiobinder_av::CleanupPolicy;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Base directory for the temp space (default: the input directory)
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Length of each transcode segment in seconds
    #[serde(default = "default_segment_length")]
    pub segment_length_secs: f64,

    /// Parallel workers (default: number of logical CPUs)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Output bitrate in kb/s, or "source" to reuse the input bitrate
    #[serde(default)]
    pub bitrate: Bitrate,
}

fn default_segment_length() -> f64 {
    600.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_length_secs: default_segment_length(),
            workers: None,
            bitrate: Bitrate::default(),
        }
    }
}

impl PipelineConfig {
    /// Segment length as a [`Duration`]; fails for values no `Duration` can hold.
    pub fn segment_length(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.segment_length_secs).map_err(|_| {
            BindError::configuration(format!(
                "segment_length_secs is out of range: {}",
                self.segment_length_secs
            ))
        })
    }

    /// Configured worker count, or one per logical CPU.
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    /// Attempts at removing the temp space before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_ms() -> u64 {
    200
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl CleanupConfig {
    pub fn policy(&self) -> CleanupPolicy {
        CleanupPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe: Option<PathBuf>,
}

/// Target AAC bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitrate {
    /// Fixed bitrate in kb/s.
    Kbps(u32),
    /// Probe the first source file and reuse its bitrate.
    Source,
}

impl Default for Bitrate {
    fn default() -> Self {
        Bitrate::Kbps(DEFAULT_BITRATE_KBPS)
    }
}

impl Bitrate {
    fn from_number(n: i64) -> std::result::Result<Self, String> {
        match n {
            -1 => Ok(Bitrate::Source),
            n if n > 0 => u32::try_from(n)
                .map(Bitrate::Kbps)
                .map_err(|_| format!("Bitrate out of range: {}", n)),
            _ => Err(format!("Bitrate must be positive or -1, got {}", n)),
        }
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("source") {
            return Ok(Bitrate::Source);
        }
        let digits = s.strip_suffix(['k', 'K']).unwrap_or(s);
        let n: i64 = digits
            .parse()
            .map_err(|_| format!("Invalid bitrate: {}", s))?;
        Bitrate::from_number(n)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bitrate::Kbps(n) => write!(f, "{}k", n),
            Bitrate::Source => f.write_str("source"),
        }
    }
}

impl Serialize for Bitrate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Bitrate::Kbps(n) => serializer.serialize_u32(*n),
            Bitrate::Source => serializer.serialize_str("source"),
        }
    }
}

impl<'de> Deserialize<'de> for Bitrate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(i64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Bitrate::from_number(n).map_err(de::Error::custom),
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}
