//! Locating and ordering the source tracks of an audiobook.

use crate::error::{BindError, Result};
use audiobinder_av::{probe_audio, AudioFormat, AudioProbe, ProcessRegistry, ToolPaths};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;

/// One ordered source audio file.
#[derive(Debug)]
pub struct Track {
    path: PathBuf,
    format: AudioFormat,
    position: usize,
    probe: OnceCell<AudioProbe>,
}

impl Track {
    pub fn new(path: impl Into<PathBuf>, format: AudioFormat, position: usize) -> Self {
        Self {
            path: path.into(),
            format,
            position,
            probe: OnceCell::new(),
        }
    }

    fn with_probe(path: PathBuf, format: AudioFormat, probe: Option<AudioProbe>) -> Self {
        Self {
            path,
            format,
            position: 0,
            probe: OnceCell::new_with(probe),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Zero-based position in the book.
    pub fn position(&self) -> usize {
        self.position
    }

    /// ffprobe result, computed on first use.
    pub async fn probe(
        &self,
        tools: &ToolPaths,
        registry: &ProcessRegistry,
    ) -> audiobinder_av::Result<&AudioProbe> {
        self.probe
            .get_or_try_init(|| probe_audio(tools, registry, &self.path))
            .await
    }

    pub async fn duration(
        &self,
        tools: &ToolPaths,
        registry: &ProcessRegistry,
    ) -> audiobinder_av::Result<Duration> {
        self.probe(tools, registry).await?.duration.ok_or_else(|| {
            audiobinder_av::Error::parse_error(
                "ffprobe",
                format!("no duration reported for {:?}", self.path),
            )
        })
    }
}

/// List the audio files of the dominant format in `dir`, sorted lexically.
///
/// The dominant format is the one with the most files; ties go to the format
/// listed first in [`AudioFormat::ALL`].
pub fn scan_audio_files(dir: &Path) -> Result<(AudioFormat, Vec<PathBuf>)> {
    if !dir.is_dir() {
        return Err(BindError::discovery(format!(
            "Input directory not found: {:?}",
            dir
        )));
    }

    let mut by_format: HashMap<AudioFormat, Vec<PathBuf>> = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(format) = AudioFormat::from_path(&path) {
            by_format.entry(format).or_default().push(path);
        }
    }

    let dominant = AudioFormat::ALL
        .iter()
        .copied()
        .filter(|f| by_format.contains_key(f))
        .fold(None::<(AudioFormat, usize)>, |best, format| {
            let count = by_format[&format].len();
            match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((format, count)),
            }
        });

    let Some((format, _)) = dominant else {
        return Err(BindError::discovery(format!(
            "No audio files found in {:?}",
            dir
        )));
    };

    for (other, files) in &by_format {
        if *other != format {
            tracing::warn!(
                "Ignoring {} {} file(s); binding {} files",
                files.len(),
                other,
                format
            );
        }
    }

    let mut files = by_format.remove(&format).unwrap_or_default();
    files.sort();
    Ok((format, files))
}

/// Discover and order the tracks in `dir`.
///
/// Files are sorted lexically, then stably by their track-number tag. Files
/// whose tags cannot be read sort as track 0. At most `concurrency` probes
/// run at once; a probe that cannot even be started fails discovery.
pub async fn discover_tracks(
    dir: &Path,
    tools: &ToolPaths,
    registry: &ProcessRegistry,
    concurrency: usize,
) -> Result<Vec<Track>> {
    let (format, files) = scan_audio_files(dir)?;
    tracing::info!("Found {} {} file(s) in {:?}", files.len(), format, dir);

    let probes: Vec<audiobinder_av::Result<AudioProbe>> = stream::iter(&files)
        .map(|path| probe_audio(tools, registry, path))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    if registry.is_terminating() {
        return Err(BindError::Cancelled);
    }

    let probes = files
        .iter()
        .zip(probes)
        .map(|(path, probe)| match probe {
            Ok(probe) => Ok(Some(probe)),
            Err(e @ audiobinder_av::Error::SpawnFailed { .. }) => Err(BindError::Tool(e)),
            Err(e) if e.is_killed() => Ok(None),
            Err(e) => {
                tracing::warn!("Could not read tags from {:?}: {}", path, e);
                Ok(None)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let mut tracks: Vec<Track> = files
        .into_iter()
        .zip(probes)
        .map(|(path, probe)| Track::with_probe(path, format, probe))
        .collect();

    tracks.sort_by_key(|t| {
        t.probe
            .get()
            .and_then(|p| p.tags.track_number())
            .unwrap_or(0)
    });
    for (position, track) in tracks.iter_mut().enumerate() {
        track.position = position;
    }

    Ok(tracks)
}

/// First `*.cue` file in `dir`, by lexical order.
pub fn find_cue_sheet(dir: &Path) -> Result<PathBuf> {
    let mut sheets: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case("cue"))
                    .unwrap_or(false)
        })
        .collect();
    sheets.sort();

    sheets
        .into_iter()
        .next()
        .ok_or_else(|| BindError::discovery(format!("No CUE sheet found in {:?}", dir)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_scan_picks_dominant_format() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "02.mp3");
        touch(dir.path(), "01.mp3");
        touch(dir.path(), "bonus.flac");
        touch(dir.path(), "cover.jpg");

        let (format, files) = scan_audio_files(dir.path()).unwrap();
        assert_eq!(format, AudioFormat::Mp3);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["01.mp3", "02.mp3"]);
    }

    #[test]
    fn test_scan_tie_prefers_earlier_format() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.flac");
        touch(dir.path(), "b.mp3");

        let (format, _) = scan_audio_files(dir.path()).unwrap();
        assert_eq!(format, AudioFormat::Mp3);
    }

    #[test]
    fn test_scan_empty_directory_is_discovery_error() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "notes.txt");
        std::fs::create_dir(dir.path().join("nested.mp3")).unwrap();

        let result = scan_audio_files(dir.path());
        assert!(matches!(result, Err(BindError::Discovery(_))));
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = tempdir().unwrap();
        let result = scan_audio_files(&dir.path().join("gone"));
        assert!(matches!(result, Err(BindError::Discovery(_))));
    }

    #[test]
    fn test_find_cue_sheet() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            find_cue_sheet(dir.path()),
            Err(BindError::Discovery(_))
        ));

        touch(dir.path(), "b.cue");
        touch(dir.path(), "a.CUE");
        let sheet = find_cue_sheet(dir.path()).unwrap();
        assert_eq!(sheet.file_name().unwrap(), "a.CUE");
    }

    #[tokio::test]
    async fn test_discover_without_probe_keeps_lexical_order() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.mp3");
        touch(dir.path(), "a.mp3");
        let tools = ToolPaths {
            ffmpeg: "nonexistent_ffmpeg_xyz".into(),
            ffprobe: "nonexistent_ffprobe_xyz".into(),
        };
        let registry = ProcessRegistry::new();

        let tracks = discover_tracks(dir.path(), &tools, &registry, 1).await.unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].path().ends_with("a.mp3"));
        assert_eq!(tracks[0].position(), 0);
        assert!(tracks[1].path().ends_with("b.mp3"));
        assert_eq!(tracks[1].position(), 1);
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unstartable_ffprobe_fails_discovery() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "01.mp3");
        touch(dir.path(), "02.mp3");
        let ffprobe = dir.path().join("ffprobe");
        std::fs::write(&ffprobe, b"not executable").unwrap();
        let tools = ToolPaths {
            ffmpeg: "nonexistent_ffmpeg_xyz".into(),
            ffprobe,
        };

        let result = discover_tracks(dir.path(), &tools, &ProcessRegistry::new(), 2).await;
        assert!(matches!(
            result,
            Err(BindError::Tool(audiobinder_av::Error::SpawnFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_track_duration_is_cached() {
        let track = Track::with_probe(
            PathBuf::from("/books/01.mp3"),
            AudioFormat::Mp3,
            Some(AudioProbe {
                duration: Some(Duration::from_secs(42)),
                ..Default::default()
            }),
        );
        let tools = ToolPaths {
            ffmpeg: "nonexistent_ffmpeg_xyz".into(),
            ffprobe: "nonexistent_ffprobe_xyz".into(),
        };

        let duration = track
            .duration(&tools, &ProcessRegistry::new())
            .await
            .unwrap();
        assert_eq!(duration, Duration::from_secs(42));
    }
}
