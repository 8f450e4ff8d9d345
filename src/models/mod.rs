use serde::Deserialize;
use std::sync::Arc;

/// One point-in-time snapshot of the player as reported by `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaybackStatus {
    pub stopped: bool,
    pub paused: bool,
    pub buffering: bool,
    pub volume: i64,
    pub volume_steps: i64,
    pub shuffle_context: bool,
    pub track: Option<Track>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Track {
    pub uri: String,
    pub name: String,
    #[serde(rename = "artist_names", default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album_name: String,
    #[serde(rename = "album_cover_url", default)]
    pub album_art_url: Option<String>,
    #[serde(rename = "position", default)]
    pub position_ms: i64,
    #[serde(rename = "duration", default)]
    pub duration_ms: i64,
}

impl Track {
    /// Cover URL, treating the empty string some daemons emit as absent.
    pub fn artwork_url(&self) -> Option<&str> {
        self.album_art_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

impl PlaybackStatus {
    pub fn phase(&self) -> PlaybackPhase {
        if self.stopped {
            PlaybackPhase::Stopped
        } else if self.paused {
            PlaybackPhase::Paused
        } else if self.buffering {
            PlaybackPhase::Interrupted
        } else {
            PlaybackPhase::Playing
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    Playing,
    Paused,
    Interrupted,
    #[default]
    Stopped,
}

impl std::fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackPhase::Playing => write!(f, "playing"),
            PlaybackPhase::Paused => write!(f, "paused"),
            PlaybackPhase::Interrupted => write!(f, "interrupted"),
            PlaybackPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Decoded cover art together with the URL it was downloaded from.
#[derive(Debug, Clone)]
pub struct Artwork {
    pub url: String,
    pub image: Arc<image::RgbaImage>,
}

impl Artwork {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

impl PartialEq for Artwork {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && Arc::ptr_eq(&self.image, &other.image)
    }
}

/// Publish-ready view of the current track for the system media controls.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingSnapshot {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_secs: f64,
    pub elapsed_secs: f64,
    pub rate: f64,
    pub phase: PlaybackPhase,
    pub artwork: Option<Artwork>,
}

/// Payload-less transport verbs understood by `POST /player/{verb}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    PlayPause,
    Resume,
    Pause,
    Next,
    Prev,
}

impl TransportCommand {
    pub fn path(&self) -> &'static str {
        match self {
            TransportCommand::PlayPause => "playpause",
            TransportCommand::Resume => "resume",
            TransportCommand::Pause => "pause",
            TransportCommand::Next => "next",
            TransportCommand::Prev => "prev",
        }
    }
}

impl std::fmt::Display for TransportCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

pub fn format_time(ms: i64) -> String {
    let total = ms.max(0) / 1000;
    let minutes = total / 60;
    let seconds = total % 60;
    format!("{minutes}:{seconds:02}")
}
