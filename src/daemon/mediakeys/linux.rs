use anyhow::{Context, Result};
use mpris_server::{Metadata, PlaybackStatus, Player, Time};
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{CommandBridge, CommandRegistrar, CommandStatus, NowPlayingSink, RemoteEvent};
use crate::models::{NowPlayingSnapshot, PlaybackPhase};

enum Update {
    Publish {
        metadata: Metadata,
        status: PlaybackStatus,
        position: Time,
    },
    Phase(PlaybackStatus),
    Clear,
}

/// MPRIS D-Bus player (`org.mpris.MediaPlayer2.<identity>`) for desktop media
/// keys and widgets.
///
/// `Player` is not `Send`, so this must be created inside a `LocalSet`.
/// Property updates are queued to a single local task so they reach D-Bus in
/// the order the daemon published them.
pub struct MprisHost {
    player: Rc<Player>,
    updates: mpsc::UnboundedSender<Update>,
}

impl MprisHost {
    pub async fn new(identity: &str) -> Result<Self> {
        let player = Player::builder(identity)
            .identity("Now Playing Bridge")
            .can_play(true)
            .can_pause(true)
            .can_go_next(true)
            .can_go_previous(true)
            .can_seek(true)
            .can_control(true)
            .can_quit(false)
            .can_raise(false)
            .build()
            .await
            .context("Unable to create MPRIS player")?;
        let player = Rc::new(player);

        tokio::task::spawn_local(player.run());

        let (updates, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_local(apply_updates(Rc::clone(&player), rx));

        Ok(Self { player, updates })
    }

    fn queue(&self, update: Update) {
        if self.updates.send(update).is_err() {
            warn!("MPRIS update task is gone");
        }
    }
}

async fn apply_updates(player: Rc<Player>, mut rx: mpsc::UnboundedReceiver<Update>) {
    while let Some(update) = rx.recv().await {
        let result = match update {
            Update::Publish {
                metadata,
                status,
                position,
            } => {
                player.set_position(position);
                match player.set_metadata(metadata).await {
                    Ok(()) => player.set_playback_status(status).await,
                    Err(e) => Err(e),
                }
            }
            Update::Phase(status) => player.set_playback_status(status).await,
            Update::Clear => match player.set_metadata(Metadata::new()).await {
                Ok(()) => player.set_playback_status(PlaybackStatus::Stopped).await,
                Err(e) => Err(e),
            },
        };

        if let Err(e) = result {
            warn!("Failed to update MPRIS properties: {e}");
        }
    }
}

fn playback_status(phase: PlaybackPhase) -> PlaybackStatus {
    match phase {
        PlaybackPhase::Playing => PlaybackStatus::Playing,
        // MPRIS has no buffering state; a stalled stream is not advancing.
        PlaybackPhase::Paused | PlaybackPhase::Interrupted => PlaybackStatus::Paused,
        PlaybackPhase::Stopped => PlaybackStatus::Stopped,
    }
}

fn metadata(snapshot: &NowPlayingSnapshot) -> Metadata {
    let mut builder = Metadata::builder()
        .title(snapshot.title.clone())
        .artist([snapshot.artist.clone()])
        .album(snapshot.album.clone())
        .length(Time::from_millis((snapshot.duration_secs * 1000.0) as i64));

    if let Some(artwork) = &snapshot.artwork {
        builder = builder.art_url(artwork.url.clone());
    }

    builder.build()
}

impl NowPlayingSink for MprisHost {
    fn publish(&mut self, snapshot: &NowPlayingSnapshot) {
        self.queue(Update::Publish {
            metadata: metadata(snapshot),
            status: playback_status(snapshot.phase),
            position: Time::from_millis((snapshot.elapsed_secs * 1000.0) as i64),
        });
    }

    fn set_phase(&mut self, phase: PlaybackPhase) {
        self.queue(Update::Phase(playback_status(phase)));
    }

    fn clear(&mut self) {
        self.queue(Update::Clear);
    }
}

/// Absolute position in seconds after moving `offset` from `position`,
/// clamped to the start of the track.
fn seek_target(position: Time, offset: Time) -> f64 {
    let micros = position.as_micros().saturating_add(offset.as_micros()).max(0);
    micros as f64 / 1_000_000.0
}

fn dispatch(bridge: &CommandBridge, event: RemoteEvent) {
    if bridge.handle(event) == CommandStatus::CommandFailed {
        debug!("Rejected MPRIS event {event:?}");
    }
}

impl CommandRegistrar for MprisHost {
    fn register_commands(&mut self, bridge: CommandBridge) -> Result<()> {
        let b = bridge.clone();
        self.player
            .connect_play_pause(move |_| dispatch(&b, RemoteEvent::TogglePlayPause));

        let b = bridge.clone();
        self.player
            .connect_play(move |_| dispatch(&b, RemoteEvent::Play));

        let b = bridge.clone();
        self.player
            .connect_pause(move |_| dispatch(&b, RemoteEvent::Pause));

        let b = bridge.clone();
        self.player
            .connect_next(move |_| dispatch(&b, RemoteEvent::Next));

        let b = bridge.clone();
        self.player
            .connect_previous(move |_| dispatch(&b, RemoteEvent::Previous));

        let b = bridge.clone();
        self.player.connect_set_position(move |_, _track_id, position| {
            let seconds = position.as_millis() as f64 / 1000.0;
            dispatch(&b, RemoteEvent::ChangePosition(Some(seconds)));
        });

        // Relative seeks are resolved against the last published position.
        self.player.connect_seek(move |player, offset| {
            let target = seek_target(player.position(), offset);
            dispatch(&bridge, RemoteEvent::ChangePosition(Some(target)));
        });

        Ok(())
    }
}
