//! Seams between the bridge and the operating system's media controls.
//!
//! The daemon owns its sink by value and only touches it from the event loop.
//! Command callbacks may arrive on any OS thread; they only ever reach the
//! [`CommandBridge`], which holds no published state.

use anyhow::Result;
use tracing::{debug, info};

use crate::client::StatusClient;
use crate::models::{NowPlayingSnapshot, PlaybackPhase, TransportCommand};

#[cfg(target_os = "linux")]
pub mod linux;

/// The "now playing" info surface.
pub trait NowPlayingSink {
    fn publish(&mut self, snapshot: &NowPlayingSnapshot);

    /// Change the phase only, leaving the published metadata alone.
    fn set_phase(&mut self, phase: PlaybackPhase);

    fn clear(&mut self);
}

/// Where OS control events get wired to the bridge.
pub trait CommandRegistrar {
    fn register_commands(&mut self, bridge: CommandBridge) -> Result<()>;
}

/// A control event delivered by the OS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteEvent {
    TogglePlayPause,
    Play,
    Pause,
    Next,
    Previous,
    /// Absolute position in seconds, if the event carried one.
    ChangePosition(Option<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    CommandFailed,
}

/// Routes each OS control event to exactly one daemon request.
#[derive(Debug, Clone)]
pub struct CommandBridge {
    client: StatusClient,
}

impl CommandBridge {
    pub fn new(client: StatusClient) -> Self {
        Self { client }
    }

    /// Acknowledges synchronously; the request itself is fire-and-forget.
    pub fn handle(&self, event: RemoteEvent) -> CommandStatus {
        debug!("Remote event: {event:?}");

        let command = match event {
            RemoteEvent::TogglePlayPause => TransportCommand::PlayPause,
            RemoteEvent::Play => TransportCommand::Resume,
            RemoteEvent::Pause => TransportCommand::Pause,
            RemoteEvent::Next => TransportCommand::Next,
            RemoteEvent::Previous => TransportCommand::Prev,
            RemoteEvent::ChangePosition(position) => {
                return match position_ms(position) {
                    Some(ms) => {
                        self.client.send_seek(ms);
                        CommandStatus::Success
                    }
                    None => CommandStatus::CommandFailed,
                };
            }
        };

        self.client.send_transport_command(command);
        CommandStatus::Success
    }
}

fn position_ms(position: Option<f64>) -> Option<i64> {
    let seconds = position.filter(|s| s.is_finite() && *s >= 0.0)?;
    Some((seconds * 1000.0) as i64)
}

/// Headless host: reports state changes through the log and registers no
/// OS handlers. Used where no media-control service is available.
#[derive(Debug, Default)]
pub struct LogHost {
    last_title: Option<String>,
    phase: PlaybackPhase,
}

impl NowPlayingSink for LogHost {
    fn publish(&mut self, snapshot: &NowPlayingSnapshot) {
        if self.last_title.as_deref() != Some(snapshot.title.as_str()) {
            info!(
                "Now playing: {} - {} ({})",
                snapshot.artist, snapshot.title, snapshot.album
            );
            self.last_title = Some(snapshot.title.clone());
        }
        debug!(
            "Position {:.1}s / {:.1}s at rate {}",
            snapshot.elapsed_secs, snapshot.duration_secs, snapshot.rate
        );
        if let Some(artwork) = &snapshot.artwork {
            let (width, height) = artwork.dimensions();
            debug!("Artwork {width}x{height} from {}", artwork.url);
        }
        self.set_phase(snapshot.phase);
    }

    fn set_phase(&mut self, phase: PlaybackPhase) {
        if self.phase != phase {
            info!("Playback {phase}");
            self.phase = phase;
        }
    }

    fn clear(&mut self) {
        if self.last_title.take().is_some() {
            info!("Now playing cleared");
        }
        self.phase = PlaybackPhase::Stopped;
    }
}

impl CommandRegistrar for LogHost {
    fn register_commands(&mut self, _bridge: CommandBridge) -> Result<()> {
        info!("No media control service available; remote commands disabled");
        Ok(())
    }
}
