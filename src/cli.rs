use audiobinder::chapters::ChapterMode;
use audiobinder::config::Bitrate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "audiobinder")]
#[command(author, version, about = "Bind a directory of audio tracks into a chaptered audiobook")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcode and bind the tracks in a directory into one .m4b
    Bind {
        /// How chapters are derived: files, cue or none
        #[arg(long, required = true)]
        chapters: ChapterMode,

        /// Directory holding the source tracks
        #[arg(short, long, default_value = ".")]
        input: PathBuf,

        /// Directory to write the book to (default: the input directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bitrate in kb/s, or "source" (or -1) to keep the input bitrate
        #[arg(short, long, allow_negative_numbers = true)]
        bitrate: Option<Bitrate>,

        /// Segment length in seconds
        #[arg(short, long)]
        segment_secs: Option<f64>,

        /// Number of parallel workers
        #[arg(short = 'j', long)]
        workers: Option<usize>,
    },

    /// Print the chapter metadata a CUE sheet produces
    Chapters {
        /// CUE sheet to read
        #[arg(long, required = true)]
        cue: PathBuf,

        /// Total audio length in seconds
        #[arg(long, required = true)]
        duration: f64,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
