//! Warming of the next segment on the standby handle
//!
//! At most one segment is warmed at any time, and it always belongs to the
//! station being listened to. The controller never touches the active handle.

use crate::error::Result;
use crate::handle::PlaybackHandle;
use url::Url;

/// A segment buffered and ready to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmedSegment {
    pub address: Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WarmRecord {
    station: String,
    segment: WarmedSegment,
}

/// Tracks which segment sits loaded on the standby handle
#[derive(Debug, Default)]
pub struct PreloadController {
    record: Option<WarmRecord>,
    loads_issued: u64,
}

impl PreloadController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `address` on `standby` and remember it as ready for `station`
    ///
    /// Does nothing when `address` is already warmed or is the segment
    /// currently playing. Returns whether a load was issued. A failed load
    /// leaves no record, so the next poll retries it.
    pub fn warm<H: PlaybackHandle>(
        &mut self,
        station: &str,
        address: &Url,
        standby: &mut H,
        playing: Option<&Url>,
    ) -> Result<bool> {
        if playing == Some(address) {
            return Ok(false);
        }
        if let Some(record) = &self.record {
            if record.station == station && record.segment.address == *address {
                return Ok(false);
            }
        }

        // Whatever was warmed before is replaced, even on failure below
        self.record = None;
        self.loads_issued += 1;
        standby.load(address)?;

        tracing::debug!(station = %station, segment = %address, "Warmed next segment");
        self.record = Some(WarmRecord {
            station: station.to_string(),
            segment: WarmedSegment {
                address: address.clone(),
            },
        });
        Ok(true)
    }

    /// The segment warmed for `station`, if any
    pub fn warmed(&self, station: &str) -> Option<&WarmedSegment> {
        self.record
            .as_ref()
            .filter(|r| r.station == station)
            .map(|r| &r.segment)
    }

    pub fn is_warmed(&self, station: &str, address: &Url) -> bool {
        self.warmed(station).is_some_and(|s| s.address == *address)
    }

    /// Take the warmed segment of `station`, clearing the record
    pub fn consume(&mut self, station: &str) -> Option<WarmedSegment> {
        if self.record.as_ref().is_some_and(|r| r.station == station) {
            self.record.take().map(|r| r.segment)
        } else {
            None
        }
    }

    /// Forget whatever was warmed
    pub fn abandon(&mut self) {
        if let Some(record) = self.record.take() {
            tracing::debug!(station = %record.station, "Abandoned warmed segment");
        }
    }

    /// Number of standby loads issued since creation
    pub fn loads_issued(&self) -> u64 {
        self.loads_issued
    }
}
