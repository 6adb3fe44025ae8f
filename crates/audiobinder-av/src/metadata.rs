//! Album-level metadata carried into the bound audiobook.

use crate::probe::AudioProbe;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_DATE: &str = "Unknown Date";
/// Bitrate used when none is configured and none can be probed.
pub const DEFAULT_BITRATE_KBPS: u32 = 128;

/// Artist, album and date tags plus the target AAC bitrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumMetadata {
    pub artist: String,
    pub album: String,
    pub date: String,
    pub bitrate_kbps: u32,
}

impl Default for AlbumMetadata {
    fn default() -> Self {
        Self {
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            date: UNKNOWN_DATE.to_string(),
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
        }
    }
}

impl AlbumMetadata {
    /// Placeholder metadata with the given bitrate.
    pub fn placeholder(bitrate_kbps: u32) -> Self {
        Self {
            bitrate_kbps,
            ..Self::default()
        }
    }

    /// Build metadata from a probe, falling back per field.
    pub fn from_probe(probe: &AudioProbe, bitrate_kbps: u32) -> Self {
        let field = |value: &Option<String>, fallback: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };

        Self {
            artist: field(&probe.tags.artist, UNKNOWN_ARTIST),
            album: field(&probe.tags.album, UNKNOWN_ALBUM),
            date: field(&probe.tags.date, UNKNOWN_DATE),
            bitrate_kbps,
        }
    }
}
