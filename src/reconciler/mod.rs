//! Decides what the system media controls should show for each fetched status.
//!
//! The reconciler owns the only mutable "what did we publish" state. It is
//! driven exclusively from the daemon's event loop, so no locking is needed:
//! network completions are routed back to that loop before they reach here.

use tracing::debug;

use crate::models::{Artwork, NowPlayingSnapshot, PlaybackPhase, PlaybackStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Daemon reports stopped: clear the media controls.
    Cleared,
    /// No track in the feed. `buffering` asks for an interrupted phase;
    /// otherwise whatever was last published stays.
    NoTrack { buffering: bool },
    /// Publish `snapshot`. `artwork_refetch` carries the cover URL to download
    /// when the track identity just changed.
    Snapshot {
        snapshot: NowPlayingSnapshot,
        artwork_refetch: Option<String>,
    },
}

#[derive(Debug, Default)]
pub struct PublishedState {
    pub last_track_uri: Option<String>,
    /// Cached cover, always paired with the URL it came from.
    pub cached_artwork: Option<Artwork>,
    /// Cover URL requested by the most recent identity change.
    pub pending_artwork_url: Option<String>,
    /// What the sink currently shows; `None` once cleared.
    pub last_snapshot: Option<NowPlayingSnapshot>,
}

#[derive(Debug, Default)]
pub struct StateReconciler {
    state: PublishedState,
}

impl StateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn state(&self) -> &PublishedState {
        &self.state
    }

    pub fn reconcile(&mut self, status: &PlaybackStatus) -> ReconcileOutcome {
        if status.stopped {
            self.state.last_track_uri = None;
            self.state.pending_artwork_url = None;
            self.state.last_snapshot = None;
            return ReconcileOutcome::Cleared;
        }

        let Some(track) = &status.track else {
            return ReconcileOutcome::NoTrack {
                buffering: status.buffering,
            };
        };

        let art_url = track.artwork_url();
        let changed = self.state.last_track_uri.as_deref() != Some(track.uri.as_str());

        // Latch identity now so a second status for the same transition,
        // arriving before the download finishes, does not fetch again.
        // Every identity change also replaces the pending cover, so a late
        // download for an earlier track never lands on this one.
        let artwork_refetch = if changed {
            debug!("Track changed to {}", track.uri);
            self.state.last_track_uri = Some(track.uri.clone());
            self.state.pending_artwork_url = art_url.map(str::to_string);
            self.state.pending_artwork_url.clone()
        } else {
            None
        };

        // Keep showing the cached cover while a newer one downloads; drop it
        // only when the current track has no cover at all.
        let artwork = art_url.and(self.state.cached_artwork.clone());

        let phase = status.phase();
        let snapshot = NowPlayingSnapshot {
            title: track.name.clone(),
            artist: track.artist_line(),
            album: track.album_name.clone(),
            duration_secs: track.duration_ms as f64 / 1000.0,
            elapsed_secs: track.position_ms as f64 / 1000.0,
            rate: if phase == PlaybackPhase::Paused { 0.0 } else { 1.0 },
            phase,
            artwork,
        };

        self.state.last_snapshot = Some(snapshot.clone());

        ReconcileOutcome::Snapshot {
            snapshot,
            artwork_refetch,
        }
    }

    /// Records a finished download and returns the last published snapshot
    /// with the new cover merged in, if anything needs republishing.
    ///
    /// Only the cover for the most recent identity change is accepted, so a
    /// slow response for an earlier track cannot replace a newer one.
    pub fn apply_artwork(&mut self, artwork: Artwork) -> Option<NowPlayingSnapshot> {
        if self.state.pending_artwork_url.as_deref() != Some(artwork.url.as_str()) {
            debug!("Discarding stale artwork for {}", artwork.url);
            return None;
        }

        self.state.pending_artwork_url = None;
        self.state.cached_artwork = Some(artwork.clone());

        let snapshot = self.state.last_snapshot.as_mut()?;
        snapshot.artwork = Some(artwork);
        Some(snapshot.clone())
    }

    /// The sink was cleared without a reconcile (daemon unreachable). Keeps
    /// the track identity so a reconnect does not refetch the same cover.
    pub fn forget_published(&mut self) {
        self.state.last_snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Track;
    use std::sync::Arc;

    fn track(uri: &str, art: Option<&str>, position_ms: i64) -> Track {
        Track {
            uri: uri.to_string(),
            name: "Song".to_string(),
            artists: vec!["A".to_string()],
            album_name: "Alb".to_string(),
            album_art_url: art.map(str::to_string),
            position_ms,
            duration_ms: 200_000,
        }
    }

    fn playing(track: Track) -> PlaybackStatus {
        PlaybackStatus {
            track: Some(track),
            ..Default::default()
        }
    }

    fn artwork(url: &str) -> Artwork {
        Artwork {
            url: url.to_string(),
            image: Arc::new(image::RgbaImage::new(1, 1)),
        }
    }

    fn unwrap_snapshot(outcome: ReconcileOutcome) -> (NowPlayingSnapshot, Option<String>) {
        match outcome {
            ReconcileOutcome::Snapshot {
                snapshot,
                artwork_refetch,
            } => (snapshot, artwork_refetch),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_playing_snapshot_fields() {
        let mut reconciler = StateReconciler::new();
        let (snapshot, refetch) =
            unwrap_snapshot(reconciler.reconcile(&playing(track("t1", None, 1000))));

        assert_eq!(snapshot.title, "Song");
        assert_eq!(snapshot.artist, "A");
        assert_eq!(snapshot.album, "Alb");
        assert_eq!(snapshot.elapsed_secs, 1.0);
        assert_eq!(snapshot.duration_secs, 200.0);
        assert_eq!(snapshot.rate, 1.0);
        assert_eq!(snapshot.phase, PlaybackPhase::Playing);
        assert!(snapshot.artwork.is_none());
        assert_eq!(refetch, None);
        assert_eq!(reconciler.state().last_track_uri.as_deref(), Some("t1"));
    }

    #[test]
    fn test_new_track_with_cover_requests_fetch() {
        let mut reconciler = StateReconciler::new();
        let (_, refetch) =
            unwrap_snapshot(reconciler.reconcile(&playing(track("t1", Some("http://a"), 0))));
        assert_eq!(refetch.as_deref(), Some("http://a"));
    }

    #[test]
    fn test_stopped_clears_and_resets_identity() {
        let mut reconciler = StateReconciler::new();
        reconciler.reconcile(&playing(track("t1", Some("http://a"), 0)));

        let stopped = PlaybackStatus {
            stopped: true,
            track: Some(track("t1", Some("http://a"), 0)),
            ..Default::default()
        };
        assert_eq!(reconciler.reconcile(&stopped), ReconcileOutcome::Cleared);
        assert!(reconciler.state().last_track_uri.is_none());
        assert!(reconciler.state().last_snapshot.is_none());

        // Same track after a stop counts as a new transition.
        let (_, refetch) =
            unwrap_snapshot(reconciler.reconcile(&playing(track("t1", Some("http://a"), 0))));
        assert!(refetch.is_some());
    }

    #[test]
    fn test_same_status_twice_fetches_once() {
        let mut reconciler = StateReconciler::new();
        let status = playing(track("t1", Some("http://a"), 0));

        let (_, first) = unwrap_snapshot(reconciler.reconcile(&status));
        let (_, second) = unwrap_snapshot(reconciler.reconcile(&status));
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn test_position_ticks_do_not_refetch() {
        let mut reconciler = StateReconciler::new();
        let fetches = (0..5)
            .map(|i| reconciler.reconcile(&playing(track("t1", Some("http://a"), i * 2000))))
            .filter(|o| matches!(o, ReconcileOutcome::Snapshot { artwork_refetch: Some(_), .. }))
            .count();
        assert_eq!(fetches, 1);
    }

    #[test]
    fn test_paused_rate_independent_of_buffering() {
        for buffering in [false, true] {
            let mut reconciler = StateReconciler::new();
            let status = PlaybackStatus {
                paused: true,
                buffering,
                track: Some(track("t1", None, 0)),
                ..Default::default()
            };
            let (snapshot, _) = unwrap_snapshot(reconciler.reconcile(&status));
            assert_eq!(snapshot.rate, 0.0);
            assert_eq!(snapshot.phase, PlaybackPhase::Paused);
        }
    }

    #[test]
    fn test_buffering_with_track_is_interrupted() {
        let mut reconciler = StateReconciler::new();
        let status = PlaybackStatus {
            buffering: true,
            track: Some(track("t1", None, 0)),
            ..Default::default()
        };
        let (snapshot, _) = unwrap_snapshot(reconciler.reconcile(&status));
        assert_eq!(snapshot.phase, PlaybackPhase::Interrupted);
        assert_eq!(snapshot.rate, 1.0);
    }

    #[test]
    fn test_missing_track_keeps_state() {
        let mut reconciler = StateReconciler::new();
        reconciler.reconcile(&playing(track("t1", None, 0)));

        let gap = PlaybackStatus::default();
        assert_eq!(
            reconciler.reconcile(&gap),
            ReconcileOutcome::NoTrack { buffering: false }
        );
        let gap = PlaybackStatus {
            buffering: true,
            ..Default::default()
        };
        assert_eq!(
            reconciler.reconcile(&gap),
            ReconcileOutcome::NoTrack { buffering: true }
        );

        assert_eq!(reconciler.state().last_track_uri.as_deref(), Some("t1"));
        assert!(reconciler.state().last_snapshot.is_some());
    }

    #[test]
    fn test_cached_artwork_kept_across_polls() {
        let mut reconciler = StateReconciler::new();
        let status = playing(track("t1", Some("http://a"), 0));
        reconciler.reconcile(&status);

        let merged = reconciler.apply_artwork(artwork("http://a")).unwrap();
        assert_eq!(merged.artwork.as_ref().unwrap().url, "http://a");

        let (snapshot, refetch) = unwrap_snapshot(reconciler.reconcile(&status));
        assert!(refetch.is_none());
        assert_eq!(snapshot.artwork, merged.artwork);
    }

    #[test]
    fn test_old_cover_shown_while_new_one_downloads() {
        let mut reconciler = StateReconciler::new();
        reconciler.reconcile(&playing(track("t1", Some("http://a"), 0)));
        reconciler.apply_artwork(artwork("http://a"));

        let (snapshot, refetch) =
            unwrap_snapshot(reconciler.reconcile(&playing(track("t2", Some("http://b"), 0))));
        assert_eq!(refetch.as_deref(), Some("http://b"));
        assert_eq!(snapshot.artwork.unwrap().url, "http://a");
    }

    #[test]
    fn test_track_without_cover_drops_artwork() {
        let mut reconciler = StateReconciler::new();
        reconciler.reconcile(&playing(track("t1", Some("http://a"), 0)));
        reconciler.apply_artwork(artwork("http://a"));

        let (snapshot, refetch) =
            unwrap_snapshot(reconciler.reconcile(&playing(track("t2", None, 0))));
        assert!(refetch.is_none());
        assert!(snapshot.artwork.is_none());
    }

    #[test]
    fn test_artwork_merges_into_latest_snapshot() {
        let mut reconciler = StateReconciler::new();
        reconciler.reconcile(&playing(track("t1", Some("http://a"), 0)));

        // A later poll moves the position before the cover arrives.
        let paused = PlaybackStatus {
            paused: true,
            track: Some(track("t1", Some("http://a"), 9000)),
            ..Default::default()
        };
        reconciler.reconcile(&paused);

        let merged = reconciler.apply_artwork(artwork("http://a")).unwrap();
        assert_eq!(merged.elapsed_secs, 9.0);
        assert_eq!(merged.phase, PlaybackPhase::Paused);
        assert!(merged.artwork.is_some());
    }

    #[test]
    fn test_stale_artwork_is_discarded() {
        let mut reconciler = StateReconciler::new();
        reconciler.reconcile(&playing(track("t1", Some("http://a"), 0)));
        reconciler.reconcile(&playing(track("t2", Some("http://b"), 0)));

        assert!(reconciler.apply_artwork(artwork("http://a")).is_none());
        assert!(reconciler.state().cached_artwork.is_none());

        let merged = reconciler.apply_artwork(artwork("http://b")).unwrap();
        assert_eq!(merged.artwork.unwrap().url, "http://b");
    }

    #[test]
    fn test_late_cover_not_merged_into_coverless_track() {
        let mut reconciler = StateReconciler::new();
        reconciler.reconcile(&playing(track("t1", Some("http://a"), 0)));
        reconciler.reconcile(&playing(track("t2", None, 0)));

        assert!(reconciler.apply_artwork(artwork("http://a")).is_none());
        assert!(reconciler.state().cached_artwork.is_none());

        let (snapshot, _) = unwrap_snapshot(reconciler.reconcile(&playing(track("t2", None, 0))));
        assert!(snapshot.artwork.is_none());
    }

    #[test]
    fn test_late_cover_not_merged_across_stop() {
        let mut reconciler = StateReconciler::new();
        reconciler.reconcile(&playing(track("t1", Some("http://a"), 0)));

        let stopped = PlaybackStatus {
            stopped: true,
            ..Default::default()
        };
        reconciler.reconcile(&stopped);
        assert!(reconciler.state().pending_artwork_url.is_none());

        reconciler.reconcile(&playing(track("t2", None, 0)));
        assert!(reconciler.apply_artwork(artwork("http://a")).is_none());
        assert!(reconciler.state().cached_artwork.is_none());
    }

    #[test]
    fn test_artwork_after_clear_is_cached_not_published() {
        let mut reconciler = StateReconciler::new();
        reconciler.reconcile(&playing(track("t1", Some("http://a"), 0)));
        reconciler.forget_published();

        assert!(reconciler.apply_artwork(artwork("http://a")).is_none());
        assert_eq!(
            reconciler.state().cached_artwork.as_ref().unwrap().url,
            "http://a"
        );
        assert_eq!(reconciler.state().last_track_uri.as_deref(), Some("t1"));
    }
}
