mod types;

pub use types::*;

use crate::error::BindError;
use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = ["./audiobinder.toml", "~/.config/audiobinder/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> std::result::Result<(), BindError> {
    let segment = config.pipeline.segment_length_secs;
    if !segment.is_finite() || segment <= 0.0 {
        return Err(BindError::configuration(format!(
            "segment_length_secs must be greater than zero, got {}",
            segment
        )));
    }
    config.pipeline.segment_length()?;

    if config.pipeline.workers == Some(0) {
        return Err(BindError::configuration("workers must be at least 1"));
    }

    if config.pipeline.bitrate == Bitrate::Kbps(0) {
        return Err(BindError::configuration("bitrate must be greater than zero"));
    }

    if config.cleanup.max_attempts == 0 {
        return Err(BindError::configuration(
            "cleanup.max_attempts must be at least 1",
        ));
    }

    for (name, path) in [
        ("ffmpeg", &config.tools.ffmpeg),
        ("ffprobe", &config.tools.ffprobe),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, path);
            }
        }
    }

    Ok(())
}
