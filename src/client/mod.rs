//! HTTP client for the playback daemon's status and control API.
//!
//! Every request carries the configured timeout so a hung daemon can never
//! stall the poll loop or command handling. `fetch_status` is awaited by the
//! poller; the `send_*` methods are fire-and-forget and may be called from any
//! thread.

use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

use crate::config::DaemonConfig;
use crate::models::{PlaybackStatus, TransportCommand};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection refused, timeout, DNS: the daemon is treated as not running.
    #[error("cannot reach playback daemon: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed status response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("status client must be created inside a tokio runtime")]
    NoRuntime,
}

impl ClientError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

#[derive(Debug, Clone)]
pub struct StatusClient {
    http: Client,
    base_url: String,
    runtime: Handle,
}

impl StatusClient {
    pub fn new(config: &DaemonConfig) -> Result<Self, ClientError> {
        Self::with_timeout(config.base_url(), config.request_timeout())
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            runtime,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Shared HTTP client, reused for artwork downloads.
    pub fn http_client(&self) -> &Client {
        &self.http
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /status`. The HTTP status code is not inspected: an error page
    /// simply fails to decode.
    pub async fn fetch_status(&self) -> Result<PlaybackStatus, ClientError> {
        let response = self.http.get(self.url("/status")).send().await?;
        let body = response.bytes().await?;
        let status = serde_json::from_slice(&body)?;
        Ok(status)
    }

    pub async fn transport(&self, command: TransportCommand) -> Result<(), ClientError> {
        self.post(&format!("/player/{}", command.path()), None).await
    }

    pub async fn seek(&self, position_ms: i64) -> Result<(), ClientError> {
        self.post("/player/seek", Some(json!({ "position": position_ms })))
            .await
    }

    pub async fn set_volume(&self, volume: u8) -> Result<(), ClientError> {
        self.post("/player/volume", Some(json!({ "volume": volume })))
            .await
    }

    /// Starts playing `uri` (a track, album or playlist) on the daemon.
    pub async fn play_uri(&self, uri: &str) -> Result<(), ClientError> {
        self.post("/player/play", Some(json!({ "uri": uri }))).await
    }

    pub async fn add_to_queue(&self, uri: &str) -> Result<(), ClientError> {
        self.post("/player/add_to_queue", Some(json!({ "uri": uri })))
            .await
    }

    pub async fn set_shuffle(&self, enabled: bool) -> Result<(), ClientError> {
        self.post(
            "/player/shuffle_context",
            Some(json!({ "shuffle_context": enabled })),
        )
        .await
    }

    async fn post(&self, path: &str, payload: Option<serde_json::Value>) -> Result<(), ClientError> {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = payload {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    pub fn send_transport_command(&self, command: TransportCommand) {
        let client = self.clone();
        self.runtime.spawn(async move {
            if let Err(e) = client.transport(command).await {
                debug!("Dropped {command} command: {e}");
            }
        });
    }

    pub fn send_seek(&self, position_ms: i64) {
        let client = self.clone();
        self.runtime.spawn(async move {
            if let Err(e) = client.seek(position_ms).await {
                debug!("Dropped seek to {position_ms}ms: {e}");
            }
        });
    }
}
