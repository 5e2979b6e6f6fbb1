//! Data models for the Wildflower position and station endpoints
//!
//! The position endpoint speaks a loose JSON dialect (`SRC`, `numSegments`,
//! ...). It is deserialized into the `Wire*` structures and then normalized
//! into [`TrackSnapshot`] / [`SegmentSnapshot`], which the rest of the crate
//! consumes.

use crate::error::Error;
use crate::time_format::format_time;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// All station snapshots of one poll, keyed by station name
pub type SnapshotMap = HashMap<String, TrackSnapshot>;

/// Tolerance used when comparing the sum of segment durations to the track length
pub const DURATION_SUM_TOLERANCE_SECONDS: f64 = 1.0;

// ============================================================================
// Position endpoint (wire format)
// ============================================================================

/// One station entry as returned by the position endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireStation {
    pub track: WireTrack,
    pub current_segment: WireSegment,
}

/// Track block of a station entry
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTrack {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    /// Track length in seconds
    #[serde(default)]
    pub duration: f64,
    /// Elapsed seconds in the track
    #[serde(default)]
    pub position: f64,
    pub num_segments: u32,
    /// 1-based index of the segment playing server-side
    pub num_current_segment: u32,
    #[serde(default)]
    pub segment_durations: Vec<f64>,
}

/// Segment block of a station entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireSegment {
    #[serde(rename = "SRC")]
    pub src: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub position: f64,
}

// ============================================================================
// Normalized snapshots
// ============================================================================

/// Server-reported state of the segment playing on a station
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSnapshot {
    /// Media address of the segment (`.../Tracks/<folder>/Chunk_<n>.<ext>?...token=...`)
    pub address: Url,
    pub duration_seconds: f64,
    /// Elapsed seconds inside the segment, within `[0, duration_seconds]`
    pub position_seconds: f64,
}

/// Server-reported state of a station at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub title: String,
    pub author: String,
    pub total_duration_seconds: f64,
    pub segment_durations: Vec<f64>,
    /// Number of segments, at least 1
    pub segment_count: u32,
    /// 1-based, within `[1, segment_count]`
    pub current_segment_index: u32,
    pub track_position_seconds: f64,
    pub current_segment: SegmentSnapshot,
}

impl TryFrom<WireStation> for TrackSnapshot {
    type Error = Error;

    fn try_from(wire: WireStation) -> Result<Self, Self::Error> {
        let WireStation {
            track,
            current_segment,
        } = wire;

        if track.num_segments == 0 {
            return Err(Error::InvalidSnapshot("track has no segments".into()));
        }
        if track.num_current_segment == 0 || track.num_current_segment > track.num_segments {
            return Err(Error::InvalidSnapshot(format!(
                "segment {} outside 1..={}",
                track.num_current_segment, track.num_segments
            )));
        }

        let address = Url::parse(current_segment.src.trim())?;

        let total = non_negative(track.duration);
        let segment_duration = non_negative(current_segment.duration);

        Ok(Self {
            title: track.title,
            author: track.author,
            total_duration_seconds: total,
            segment_durations: track.segment_durations.into_iter().map(non_negative).collect(),
            segment_count: track.num_segments,
            current_segment_index: track.num_current_segment,
            track_position_seconds: clamp_position(track.position, total),
            current_segment: SegmentSnapshot {
                address,
                duration_seconds: segment_duration,
                position_seconds: clamp_position(current_segment.position, segment_duration),
            },
        })
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Clamp into `[0, upper]`; an unknown (zero) upper bound only clamps below.
fn clamp_position(position: f64, upper: f64) -> f64 {
    let position = non_negative(position);
    if upper > 0.0 {
        position.min(upper)
    } else {
        position
    }
}

impl TrackSnapshot {
    /// Whether the server is playing the final segment of the track
    pub fn is_last_segment(&self) -> bool {
        self.current_segment_index >= self.segment_count
    }

    /// Duration of the 1-based segment `index`, when the server published it
    ///
    /// Falls back to the current segment's own duration for the current index.
    pub fn segment_duration(&self, index: u32) -> Option<f64> {
        let listed = index
            .checked_sub(1)
            .and_then(|i| self.segment_durations.get(i as usize))
            .copied();
        match listed {
            Some(d) => Some(d),
            None if index == self.current_segment_index => {
                Some(self.current_segment.duration_seconds)
            }
            None => None,
        }
    }

    /// Whether `sum(segment_durations)` matches the track length
    ///
    /// An empty duration list carries no claim and is considered consistent.
    pub fn durations_consistent(&self, tolerance: f64) -> bool {
        if self.segment_durations.is_empty() {
            return true;
        }
        let sum: f64 = self.segment_durations.iter().sum();
        (sum - self.total_duration_seconds).abs() <= tolerance
    }

    /// Track progress in percent (0 when the length is unknown)
    pub fn progress_percent(&self) -> u32 {
        percent(self.track_position_seconds, self.total_duration_seconds)
    }

    /// Segment progress in percent (0 when the length is unknown)
    pub fn segment_progress_percent(&self) -> u32 {
        percent(
            self.current_segment.position_seconds,
            self.current_segment.duration_seconds,
        )
    }

    /// One-line operator summary of the station state
    ///
    /// `42% through Title by Author | Currently 12.5s (41%) into segment 3 (of 7)`
    pub fn status_line(&self) -> String {
        format!(
            "{}% through {} by {} | Currently {:.1}s ({}%) into segment {} (of {})",
            self.progress_percent(),
            self.title,
            self.author,
            self.current_segment.position_seconds,
            self.segment_progress_percent(),
            self.current_segment_index,
            self.segment_count
        )
    }
}

fn percent(part: f64, whole: f64) -> u32 {
    if whole <= 0.0 {
        return 0;
    }
    ((part / whole) * 100.0).round().clamp(0.0, 100.0) as u32
}

/// Normalize a raw position payload
///
/// Entries that fail validation are dropped with a warning so that one bad
/// station does not hide the others.
pub fn normalize_snapshots(raw: HashMap<String, WireStation>) -> SnapshotMap {
    raw.into_iter()
        .filter_map(|(station, wire)| match TrackSnapshot::try_from(wire) {
            Ok(snapshot) => Some((station, snapshot)),
            Err(err) => {
                tracing::warn!(station = %station, "Dropping invalid station snapshot: {}", err);
                None
            }
        })
        .collect()
}

// ============================================================================
// Station directory
// ============================================================================

/// A selectable station as listed by the stations endpoint
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StationInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub logo: Option<String>,
    /// Upcoming tracks; entries are either titles or objects carrying one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_list: Option<serde_json::Value>,
}

impl StationInfo {
    /// Titles of the station's track list, whatever shape the server used
    pub fn track_titles(&self) -> Vec<String> {
        fn title_of(item: &serde_json::Value) -> Option<String> {
            match item {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Object(map) => map
                    .get("title")
                    .and_then(|t| t.as_str())
                    .or_else(|| {
                        map.get("track")
                            .and_then(|t| t.get("title"))
                            .and_then(|t| t.as_str())
                    })
                    .map(str::to_string),
                _ => None,
            }
        }

        match &self.track_list {
            Some(serde_json::Value::Array(items)) => items.iter().filter_map(title_of).collect(),
            Some(serde_json::Value::Object(map)) => map.values().filter_map(title_of).collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// A station joined with its live availability
#[derive(Debug, Clone, PartialEq)]
pub struct StationListing {
    pub info: StationInfo,
    /// Whether the position endpoint currently reports the station
    pub available: bool,
}

/// Mark each listed station available when it has a live snapshot
pub fn merge_availability(stations: Vec<StationInfo>, snapshots: &SnapshotMap) -> Vec<StationListing> {
    stations
        .into_iter()
        .map(|info| {
            let available = snapshots.contains_key(&info.name);
            StationListing { info, available }
        })
        .collect()
}

// ============================================================================
// Now-playing view
// ============================================================================

/// What the listener-facing view should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DisplayStatus {
    #[default]
    Idle,
    Tuning,
    Live,
    Paused,
    /// A segment ended before the next one was ready
    Buffering,
    Unavailable,
}

/// UI-facing fields derived from the latest snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NowPlaying {
    pub station: Option<String>,
    pub status: DisplayStatus,
    pub title: String,
    pub author: String,
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
    pub elapsed: String,
    pub total: String,
    /// `(current, count)`, 1-based
    pub segment: Option<(u32, u32)>,
    /// Last tune-in failure, if any
    pub error: Option<String>,
}

impl NowPlaying {
    /// Blank view shown when nothing is tuned in
    pub fn idle() -> Self {
        Self {
            elapsed: format_time(0.0),
            total: format_time(0.0),
            ..Self::default()
        }
    }

    /// View shown while the first snapshot of `station` is in flight
    pub fn tuning(station: &str) -> Self {
        Self {
            station: Some(station.to_string()),
            status: DisplayStatus::Tuning,
            ..Self::idle()
        }
    }

    /// View shown when tuning in failed
    pub fn unavailable(station: &str, error: impl Into<String>) -> Self {
        Self {
            station: Some(station.to_string()),
            status: DisplayStatus::Unavailable,
            error: Some(error.into()),
            ..Self::idle()
        }
    }

    pub fn from_snapshot(station: &str, snapshot: &TrackSnapshot, status: DisplayStatus) -> Self {
        Self {
            station: Some(station.to_string()),
            status,
            title: snapshot.title.clone(),
            author: snapshot.author.clone(),
            elapsed_seconds: snapshot.track_position_seconds,
            total_seconds: snapshot.total_duration_seconds,
            elapsed: format_time(snapshot.track_position_seconds),
            total: format_time(snapshot.total_duration_seconds),
            segment: Some((snapshot.current_segment_index, snapshot.segment_count)),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire_json() -> serde_json::Value {
        json!({
            "Radio Wildflower": {
                "track": {
                    "title": "Meadow",
                    "author": "Mindseye",
                    "duration": 95.5,
                    "position": 42.0,
                    "numSegments": 3,
                    "numCurrentSegment": 2,
                    "segmentDurations": [30.0, 30.0, 35.5]
                },
                "currentSegment": {
                    "SRC": "https://storage.example/o/Tracks%2FMeadow%2FChunk_2.mp3?alt=media&token=abc",
                    "duration": 30.0,
                    "position": 12.0
                }
            }
        })
    }

    #[test]
    fn test_normalize_snapshot() {
        let raw: HashMap<String, WireStation> = serde_json::from_value(wire_json()).unwrap();
        let map = normalize_snapshots(raw);
        let snap = &map["Radio Wildflower"];

        assert_eq!(snap.title, "Meadow");
        assert_eq!(snap.segment_count, 3);
        assert_eq!(snap.current_segment_index, 2);
        assert_eq!(snap.current_segment.position_seconds, 12.0);
        assert!(!snap.is_last_segment());
        assert!(snap.durations_consistent(DURATION_SUM_TOLERANCE_SECONDS));
        assert_eq!(snap.segment_duration(3), Some(35.5));
        assert_eq!(snap.segment_duration(4), None);
    }

    #[test]
    fn test_invalid_entries_are_dropped() {
        let mut value = wire_json();
        value["Alarm Hub"] = json!({
            "track": { "title": "Beep", "numSegments": 2, "numCurrentSegment": 5 },
            "currentSegment": { "SRC": "https://storage.example/Tracks/Beep/Chunk_1.mp3?token=t" }
        });
        value["Hue Jazz"] = json!({
            "track": { "title": "Blue", "numSegments": 2, "numCurrentSegment": 1 },
            "currentSegment": { "SRC": "not a url" }
        });

        let raw: HashMap<String, WireStation> = serde_json::from_value(value).unwrap();
        let map = normalize_snapshots(raw);

        assert_eq!(map.len(), 1);
        assert!(map.contains_key("Radio Wildflower"));
    }

    #[test]
    fn test_positions_are_clamped() {
        let wire = WireStation {
            track: WireTrack {
                title: "t".into(),
                author: "a".into(),
                duration: 60.0,
                position: 75.0,
                num_segments: 2,
                num_current_segment: 2,
                segment_durations: vec![],
            },
            current_segment: WireSegment {
                src: "https://s.example/Tracks/t/Chunk_2.mp3?token=x".into(),
                duration: 30.0,
                position: -1.5,
            },
        };

        let snap = TrackSnapshot::try_from(wire).unwrap();
        assert_eq!(snap.track_position_seconds, 60.0);
        assert_eq!(snap.current_segment.position_seconds, 0.0);
        assert!(snap.is_last_segment());
        // Unlisted durations fall back to the current segment's own length
        assert_eq!(snap.segment_duration(2), Some(30.0));
        assert_eq!(snap.segment_duration(1), None);
    }

    #[test]
    fn test_status_line() {
        let raw: HashMap<String, WireStation> = serde_json::from_value(wire_json()).unwrap();
        let map = normalize_snapshots(raw);
        assert_eq!(
            map["Radio Wildflower"].status_line(),
            "44% through Meadow by Mindseye | Currently 12.0s (40%) into segment 2 (of 3)"
        );
    }

    #[test]
    fn test_track_titles_accepts_mixed_shapes() {
        let station: StationInfo = serde_json::from_value(json!({
            "name": "Legion Lofi",
            "description": "Rally behind this air force style Lofi Metal.",
            "trackList": ["March", { "title": "Drill" }, { "track": { "title": "Taps" } }, 7]
        }))
        .unwrap();

        assert_eq!(station.track_titles(), vec!["March", "Drill", "Taps"]);
        assert_eq!(station.logo, None);
    }

    #[test]
    fn test_merge_availability() {
        let raw: HashMap<String, WireStation> = serde_json::from_value(wire_json()).unwrap();
        let snapshots = normalize_snapshots(raw);
        let stations = vec![
            StationInfo {
                name: "Radio Wildflower".into(),
                description: String::new(),
                logo: None,
                track_list: None,
            },
            StationInfo {
                name: "Background Rock".into(),
                description: String::new(),
                logo: None,
                track_list: None,
            },
        ];

        let listings = merge_availability(stations, &snapshots);
        assert!(listings[0].available);
        assert!(!listings[1].available);
    }

    #[test]
    fn test_now_playing_from_snapshot() {
        let raw: HashMap<String, WireStation> = serde_json::from_value(wire_json()).unwrap();
        let map = normalize_snapshots(raw);
        let view = NowPlaying::from_snapshot("Radio Wildflower", &map["Radio Wildflower"], DisplayStatus::Live);

        assert_eq!(view.elapsed, "0:42");
        assert_eq!(view.total, "1:35");
        assert_eq!(view.segment, Some((2, 3)));
        assert_eq!(NowPlaying::idle().elapsed, "0:00");
    }
}
