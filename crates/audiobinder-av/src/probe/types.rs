//! Types produced by probing.

use std::time::Duration;

/// Container tags relevant to binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioTags {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
    /// Raw track tag, e.g. `3` or `3/12`.
    pub track: Option<String>,
}

impl AudioTags {
    /// Track number from the track tag; `3/12` yields 3.
    pub fn track_number(&self) -> Option<u32> {
        self.track
            .as_deref()
            .and_then(|t| t.split('/').next())
            .and_then(|n| n.trim().parse().ok())
    }
}

/// Probe result for one audio file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioProbe {
    /// Container duration.
    pub duration: Option<Duration>,
    /// Overall bitrate in bits per second.
    pub bit_rate: Option<u64>,
    /// Container tags.
    pub tags: AudioTags,
}

impl AudioProbe {
    /// Bitrate in kb/s, rounded up.
    pub fn bitrate_kbps(&self) -> Option<u32> {
        self.bit_rate
            .filter(|&bps| bps > 0)
            .and_then(|bps| u32::try_from(bps.div_ceil(1000)).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_number_variants() {
        let tags = |t: &str| AudioTags {
            track: Some(t.to_string()),
            ..AudioTags::default()
        };
        assert_eq!(tags("3").track_number(), Some(3));
        assert_eq!(tags("3/12").track_number(), Some(3));
        assert_eq!(tags(" 07 /12").track_number(), Some(7));
        assert_eq!(tags("side A").track_number(), None);
        assert_eq!(AudioTags::default().track_number(), None);
    }

    #[test]
    fn test_bitrate_kbps_rounds_up() {
        let probe = AudioProbe {
            bit_rate: Some(127_001),
            ..AudioProbe::default()
        };
        assert_eq!(probe.bitrate_kbps(), Some(128));

        let zero = AudioProbe {
            bit_rate: Some(0),
            ..AudioProbe::default()
        };
        assert_eq!(zero.bitrate_kbps(), None);
    }
}
