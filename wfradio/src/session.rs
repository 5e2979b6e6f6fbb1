//! Bookkeeping for the station being listened to

use crate::models::TrackSnapshot;
use std::time::Instant;
use url::Url;

/// State kept for the one active station
///
/// The synchronizer holds at most one session; tuning another station or
/// stopping drops it together with everything recorded here.
#[derive(Debug, Clone)]
pub struct StationSession {
    station_name: String,
    last_snapshot: Option<TrackSnapshot>,
    preloaded_address: Option<Url>,
    polls: u64,
    last_polled_at: Option<Instant>,
    is_active: bool,
}

impl StationSession {
    pub fn new(station_name: impl Into<String>) -> Self {
        Self {
            station_name: station_name.into(),
            last_snapshot: None,
            preloaded_address: None,
            polls: 0,
            last_polled_at: None,
            is_active: true,
        }
    }

    pub fn station_name(&self) -> &str {
        &self.station_name
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub(crate) fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn last_snapshot(&self) -> Option<&TrackSnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Replace the snapshot wholesale and count the poll
    pub fn record_snapshot(&mut self, snapshot: TrackSnapshot) {
        self.last_snapshot = Some(snapshot);
        self.polls += 1;
        self.last_polled_at = Some(Instant::now());
    }

    pub fn preloaded_address(&self) -> Option<&Url> {
        self.preloaded_address.as_ref()
    }

    pub fn mark_preloaded(&mut self, address: Url) {
        self.preloaded_address = Some(address);
    }

    /// Forget the preloaded address, typically the instant it starts playing
    pub fn clear_preloaded(&mut self) {
        self.preloaded_address = None;
    }

    /// Snapshots recorded so far
    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn last_polled_at(&self) -> Option<Instant> {
        self.last_polled_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SegmentSnapshot;

    fn snapshot(position: f64) -> TrackSnapshot {
        TrackSnapshot {
            title: "Meadow".into(),
            author: "Mindseye".into(),
            total_duration_seconds: 60.0,
            segment_durations: vec![30.0, 30.0],
            segment_count: 2,
            current_segment_index: 1,
            track_position_seconds: position,
            current_segment: SegmentSnapshot {
                address: Url::parse("https://cdn.example/Tracks/Meadow/Chunk_1.mp3?token=t").unwrap(),
                duration_seconds: 30.0,
                position_seconds: position,
            },
        }
    }

    #[test]
    fn test_snapshot_is_replaced() {
        let mut session = StationSession::new("Radio Wildflower");
        assert!(session.is_active());
        assert!(session.last_snapshot().is_none());

        session.record_snapshot(snapshot(1.0));
        session.record_snapshot(snapshot(2.0));

        assert_eq!(session.polls(), 2);
        assert_eq!(session.last_snapshot().unwrap().track_position_seconds, 2.0);
        assert!(session.last_polled_at().is_some());
    }

    #[test]
    fn test_preloaded_address() {
        let mut session = StationSession::new("Radio Wildflower");
        let address = Url::parse("https://cdn.example/Tracks/Meadow/Chunk_2.mp3?token=t").unwrap();

        session.mark_preloaded(address.clone());
        assert_eq!(session.preloaded_address(), Some(&address));
        session.clear_preloaded();
        assert_eq!(session.preloaded_address(), None);
    }
}
