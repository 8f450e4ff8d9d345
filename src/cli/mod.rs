use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
pub use commands::*;

#[derive(Parser)]
#[command(name = "nowplaying-bridge")]
#[command(about = "Mirror a headless player's status into the system now-playing controls")]
#[command(version)]
pub struct Cli {
    /// Base URL of the playback daemon (overrides the config file)
    #[arg(long, global = true, env = "NOWPLAYING_BRIDGE_URL")]
    pub base_url: Option<String>,

    /// Path to an alternate config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge in the foreground (default)
    Run,

    /// Show what the daemon is playing
    Status,

    /// Toggle play/pause
    #[command(name = "play-pause")]
    PlayPause,

    /// Play a URI, or resume playback when none is given
    Play {
        /// Track, album or playlist URI (e.g., "spotify:album:...")
        uri: Option<String>,
    },

    /// Pause playback
    Pause,

    /// Skip to the next track
    Next,

    /// Go to the previous track
    #[command(name = "prev")]
    Previous,

    /// Seek to a position (e.g., "1:30" or "90")
    Seek {
        /// Position in seconds or MM:SS format
        position: String,
    },

    /// Toggle shuffle for the current context
    Shuffle,

    /// Add a track to the queue
    Queue {
        /// Track URI
        uri: String,
    },

    /// Set the daemon volume
    Volume {
        /// Volume level (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },
}
