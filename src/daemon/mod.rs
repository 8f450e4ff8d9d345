use anyhow::{Result, bail};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::artwork::ArtworkFetcher;
use crate::client::{ClientError, StatusClient};
use crate::models::{Artwork, PlaybackPhase, PlaybackStatus};
use crate::reconciler::{ReconcileOutcome, StateReconciler};

pub mod mediakeys;

use mediakeys::{CommandBridge, CommandRegistrar, NowPlayingSink};

/// Network completions, handed back to the event loop.
#[derive(Debug)]
pub enum Event {
    StatusFetched(Result<PlaybackStatus, ClientError>),
    ArtworkFetched(Option<Artwork>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
}

/// Long-lived bridge context: owns the reconciler and the host sink, and is
/// the only place either is touched. Requests run as spawned tasks and report
/// back through `events`, so completions are applied in arrival order on the
/// loop that owns this struct.
pub struct Daemon<H> {
    client: StatusClient,
    artwork: ArtworkFetcher,
    reconciler: StateReconciler,
    host: H,
    interval: Duration,
    state: PollerState,
    reachable: Option<bool>,
    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
}

impl<H: NowPlayingSink> Daemon<H> {
    pub fn new(client: StatusClient, host: H, interval: Duration) -> Self {
        let artwork = ArtworkFetcher::new(client.http_client().clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            client,
            artwork,
            reconciler: StateReconciler::new(),
            host,
            interval,
            state: PollerState::Idle,
            reachable: None,
            events_tx,
            events_rx,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> PollerState {
        self.state
    }

    #[cfg(test)]
    pub fn host(&self) -> &H {
        &self.host
    }

    #[cfg(test)]
    pub fn reconciler(&self) -> &StateReconciler {
        &self.reconciler
    }

    /// Starts one status fetch. Ticks never wait for each other; a slow
    /// fetch simply completes after the next one has been issued.
    pub fn poll(&self) {
        let client = self.client.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = client.fetch_status().await;
            let _ = tx.send(Event::StatusFetched(result));
        });
    }

    fn fetch_artwork(&self, url: String) {
        let fetcher = self.artwork.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let artwork = fetcher.fetch(&url).await;
            let _ = tx.send(Event::ArtworkFetched(artwork));
        });
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::StatusFetched(Ok(status)) => {
                self.set_reachable(true);
                let outcome = self.reconciler.reconcile(&status);
                self.apply(outcome);
            }
            Event::StatusFetched(Err(e)) if e.is_transport() => {
                debug!("Status poll failed: {e}");
                self.set_reachable(false);
                self.reconciler.forget_published();
                self.host.clear();
            }
            Event::StatusFetched(Err(e)) => {
                debug!("Ignoring status update: {e}");
            }
            Event::ArtworkFetched(Some(artwork)) => {
                if let Some(snapshot) = self.reconciler.apply_artwork(artwork) {
                    self.host.publish(&snapshot);
                }
            }
            Event::ArtworkFetched(None) => {}
        }
    }

    fn apply(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Cleared => self.host.clear(),
            ReconcileOutcome::NoTrack { buffering: true } => {
                self.host.set_phase(PlaybackPhase::Interrupted)
            }
            ReconcileOutcome::NoTrack { buffering: false } => {}
            ReconcileOutcome::Snapshot {
                snapshot,
                artwork_refetch,
            } => {
                self.host.publish(&snapshot);
                if let Some(url) = artwork_refetch {
                    self.fetch_artwork(url);
                }
            }
        }
    }

    fn set_reachable(&mut self, reachable: bool) {
        if self.reachable != Some(reachable) {
            if reachable {
                info!("Connected to playback daemon at {}", self.client.base_url());
            } else {
                info!("Playback daemon at {} is not reachable", self.client.base_url());
            }
            self.reachable = Some(reachable);
        }
    }
}

impl<H: NowPlayingSink + CommandRegistrar> Daemon<H> {
    /// Idle -> Running: wires OS commands to the daemon and fires the first
    /// poll. There is no way back to Idle.
    pub fn start(&mut self) -> Result<()> {
        if self.state == PollerState::Running {
            bail!("Bridge is already running");
        }

        self.host
            .register_commands(CommandBridge::new(self.client.clone()))?;
        self.state = PollerState::Running;
        self.poll();

        info!(
            "Bridge running (polling {} every {:?})",
            self.client.base_url(),
            self.interval
        );
        Ok(())
    }

    pub async fn run(mut self) -> Result<()> {
        self.start()?;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll(),
                Some(event) = self.next_event() => self.handle_event(event),
            }
        }
    }
}
