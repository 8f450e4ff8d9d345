use anyhow::{Context, Result};
use std::path::Path;
#[cfg(target_os = "linux")]
use tracing::warn;

use crate::client::StatusClient;
use crate::config::Config;
use crate::daemon::Daemon;
use crate::daemon::mediakeys::LogHost;
use crate::models::{PlaybackStatus, TransportCommand, format_time};

pub struct App {
    pub config: Config,
}

impl App {
    pub fn new(config_path: Option<&Path>, base_url: Option<String>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        Ok(Self {
            config: config.with_base_url(base_url),
        })
    }

    fn client(&self) -> Result<StatusClient> {
        StatusClient::new(&self.config.daemon).with_context(|| "Failed to create HTTP client")
    }

    pub async fn run(&self) -> Result<()> {
        let client = self.client()?;
        let interval = self.config.poll.interval();

        #[cfg(target_os = "linux")]
        match crate::daemon::mediakeys::linux::MprisHost::new(&self.config.media.identity).await {
            Ok(host) => return Daemon::new(client, host, interval).run().await,
            Err(e) => warn!("MPRIS unavailable, reporting to the log instead: {e:#}"),
        }

        Daemon::new(client, LogHost::default(), interval).run().await
    }

    pub async fn status(&self) -> Result<()> {
        let client = self.client()?;
        let status = client.fetch_status().await.with_context(|| {
            format!("Cannot reach playback daemon at {}", client.base_url())
        })?;

        print_status(&status);
        Ok(())
    }

    pub async fn transport(&self, command: TransportCommand) -> Result<()> {
        let client = self.client()?;
        client
            .transport(command)
            .await
            .with_context(|| format!("Failed to send {command}"))?;

        match command {
            TransportCommand::PlayPause => println!("Toggled play/pause"),
            TransportCommand::Resume => println!("Resumed"),
            TransportCommand::Pause => println!("Paused"),
            TransportCommand::Next => println!("Next track"),
            TransportCommand::Prev => println!("Previous track"),
        }
        Ok(())
    }

    pub async fn play(&self, uri: &str) -> Result<()> {
        let client = self.client()?;
        client
            .play_uri(uri)
            .await
            .with_context(|| format!("Failed to play {uri}"))?;

        println!("Playing {uri}");
        Ok(())
    }

    pub async fn queue(&self, uri: &str) -> Result<()> {
        let client = self.client()?;
        client
            .add_to_queue(uri)
            .await
            .with_context(|| format!("Failed to queue {uri}"))?;

        println!("Added to queue");
        Ok(())
    }

    pub async fn shuffle(&self) -> Result<()> {
        let enabled = self.toggle_shuffle().await?;
        println!("Shuffle {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    /// Flips the daemon's shuffle flag and returns the new value.
    async fn toggle_shuffle(&self) -> Result<bool> {
        let client = self.client()?;
        let status = client.fetch_status().await.with_context(|| {
            format!("Cannot reach playback daemon at {}", client.base_url())
        })?;

        let enabled = !status.shuffle_context;
        client
            .set_shuffle(enabled)
            .await
            .with_context(|| "Failed to toggle shuffle")?;
        Ok(enabled)
    }

    pub async fn seek(&self, position: &str) -> Result<()> {
        let position_ms = seconds_to_ms(parse_time(position)?)?;
        let client = self.client()?;
        client
            .seek(position_ms)
            .await
            .with_context(|| "Failed to seek")?;

        println!("Seeked to {}", format_time(position_ms));
        Ok(())
    }

    pub async fn volume(&self, level: u8) -> Result<()> {
        let client = self.client()?;
        client
            .set_volume(level)
            .await
            .with_context(|| "Failed to set volume")?;

        println!("Volume: {level}%");
        Ok(())
    }
}

fn parse_time(s: &str) -> Result<u64> {
    if s.contains(':') {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() == 2 {
            let mins: u64 = parts[0].parse().context("Invalid minutes")?;
            let secs: u64 = parts[1].parse().context("Invalid seconds")?;
            return mins
                .checked_mul(60)
                .and_then(|m| m.checked_add(secs))
                .context("Position is out of range");
        }
    }

    s.parse()
        .context("Invalid time format. Use seconds or MM:SS")
}

fn seconds_to_ms(seconds: u64) -> Result<i64> {
    seconds
        .checked_mul(1000)
        .and_then(|ms| i64::try_from(ms).ok())
        .context("Position is out of range")
}

fn print_status(status: &PlaybackStatus) {
    match &status.track {
        Some(track) if !status.stopped => {
            let state = if status.paused {
                "Paused"
            } else if status.buffering {
                "Buffering"
            } else {
                "Playing"
            };
            println!("{}: {} - {}", state, track.artist_line(), track.name);
            if !track.album_name.is_empty() {
                println!("Album: {}", track.album_name);
            }
            println!(
                "Position: {} / {}",
                format_time(track.position_ms),
                format_time(track.duration_ms)
            );
        }
        _ => println!("Nothing playing"),
    }

    println!("Volume: {}/{}", status.volume, status.volume_steps);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("90").unwrap(), 90);
        assert_eq!(parse_time("1:30").unwrap(), 90);
        assert!(parse_time("1:xx").is_err());
        assert!(parse_time("soon").is_err());
    }

    #[test]
    fn test_huge_positions_are_errors() {
        let max = u64::MAX.to_string();
        assert!(parse_time(&format!("{max}:00")).is_err());
        assert!(parse_time(&format!("1:{max}")).is_err());
        assert!(seconds_to_ms(u64::MAX).is_err());
        assert!(seconds_to_ms(u64::MAX / 1000).is_err());
        assert_eq!(seconds_to_ms(90).unwrap(), 90_000);
    }

    fn app_for(server: &MockServer) -> App {
        App {
            config: Config::default().with_base_url(Some(server.uri())),
        }
    }

    #[tokio::test]
    async fn test_toggle_shuffle_flips_current_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "shuffle_context": true })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/player/shuffle_context"))
            .and(body_json(json!({ "shuffle_context": false })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        assert!(!app_for(&server).toggle_shuffle().await.unwrap());
    }

    #[tokio::test]
    async fn test_toggle_shuffle_needs_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let app = App {
            config: Config::default().with_base_url(Some("http://127.0.0.1:1".to_string())),
        };
        assert!(app.toggle_shuffle().await.is_err());
        assert!(app_for(&server).toggle_shuffle().await.is_err());
    }
}
