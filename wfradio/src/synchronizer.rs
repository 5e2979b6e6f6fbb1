//! Playback synchronization state machine
//!
//! [`PlaybackSynchronizer`] keeps the local handles aligned with the
//! server-reported position of one station. It never performs I/O: operations
//! that need fresh data hand out a [`FetchTicket`], and whoever owns the
//! network (usually [`crate::worker::SyncWorker`]) delivers the outcome back
//! through [`PlaybackSynchronizer::apply`]. Tickets carry the generation they
//! were issued under, so answers that arrive after a station switch or a stop
//! are recognised and dropped.
//!
//! ```text
//! Idle -> Tuning -> Playing <-> Paused
//!                   Playing  -> Handoff -> Playing   (preload miss)
//! any  -> Idle                                       (stop)
//! ```

use crate::constants::{
    poll_interval, progress_interval, BUFFER_SECONDS, DRIFT_TOLERANCE_SECONDS,
    PREDICTIVE_WINDOW_SECONDS,
};
use crate::error::{Error, Result};
use crate::handle::{HandlePair, PlaybackHandle};
use crate::models::{DisplayStatus, NowPlaying, SnapshotMap, TrackSnapshot};
use crate::preload::PreloadController;
use crate::segment_address::{SegmentAddressResolver, SegmentRelation};
use crate::session::StationSession;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Tunables of the synchronization loop
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    /// Seconds subtracted from the server position when starting a segment mid-way
    pub buffer_seconds: f64,
    pub drift_tolerance_seconds: f64,
    /// 0 disables the predictive switch
    pub predictive_window_seconds: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: poll_interval(),
            progress_interval: progress_interval(),
            buffer_seconds: BUFFER_SECONDS,
            drift_tolerance_seconds: DRIFT_TOLERANCE_SECONDS,
            predictive_window_seconds: PREDICTIVE_WINDOW_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    /// Waiting for the first snapshot of the station
    Tuning,
    Playing,
    Paused,
    /// A segment ended with nothing warmed; waiting for the server
    Handoff,
}

/// Why a snapshot fetch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    TuneIn,
    Poll,
    /// Re-sync right after a hand-off
    Refresh,
    /// Find out what to play after a preload miss
    Recovery,
}

/// A pending request for a snapshot, to be answered through `apply`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub station: String,
    pub reason: FetchReason,
}

/// Drives an `{active, standby}` handle pair from server snapshots
pub struct PlaybackSynchronizer<H> {
    handles: HandlePair<H>,
    preload: PreloadController,
    resolver: SegmentAddressResolver,
    settings: SyncSettings,
    session: Option<StationSession>,
    state: SyncState,
    generation: u64,
    now_playing: NowPlaying,
    /// Segment that ended without a successor ready
    ended_address: Option<Url>,
}

impl<H: PlaybackHandle> PlaybackSynchronizer<H> {
    pub fn new(active: H, standby: H, resolver: SegmentAddressResolver, settings: SyncSettings) -> Self {
        Self {
            handles: HandlePair::new(active, standby),
            preload: PreloadController::new(),
            resolver,
            settings,
            session: None,
            state: SyncState::Idle,
            generation: 0,
            now_playing: NowPlaying::idle(),
            ended_address: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session(&self) -> Option<&StationSession> {
        self.session.as_ref()
    }

    pub fn now_playing(&self) -> &NowPlaying {
        &self.now_playing
    }

    pub fn handles(&self) -> &HandlePair<H> {
        &self.handles
    }

    pub fn preload(&self) -> &PreloadController {
        &self.preload
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Leave the current station (if any) and start tuning `station`
    pub fn tune_in(&mut self, station: &str) -> FetchTicket {
        self.cancel_session();
        self.generation += 1;
        self.session = Some(StationSession::new(station));
        self.state = SyncState::Tuning;
        self.now_playing = NowPlaying::tuning(station);

        info!(station = %station, generation = self.generation, "Tuning in");
        self.ticket(station, FetchReason::TuneIn)
    }

    /// Ticket for the periodic poll, if the current state wants one
    pub fn poll(&self) -> Option<FetchTicket> {
        let station = self.session.as_ref()?.station_name();
        match self.state {
            SyncState::Playing | SyncState::Paused => Some(self.ticket(station, FetchReason::Poll)),
            SyncState::Handoff => Some(self.ticket(station, FetchReason::Recovery)),
            SyncState::Idle | SyncState::Tuning => None,
        }
    }

    pub fn pause(&mut self) {
        if self.state == SyncState::Playing {
            self.handles.active_mut().pause();
            self.state = SyncState::Paused;
            self.now_playing.status = DisplayStatus::Paused;
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state == SyncState::Paused {
            self.handles.active_mut().play()?;
            self.state = SyncState::Playing;
            self.now_playing.status = DisplayStatus::Live;
        }
        Ok(())
    }

    /// Silence everything and forget the station
    pub fn stop(&mut self) {
        if let Some(session) = &self.session {
            info!(station = %session.station_name(), "Stopping");
        }
        self.cancel_session();
        self.generation += 1;
        self.state = SyncState::Idle;
        self.now_playing = NowPlaying::idle();
    }

    // ------------------------------------------------------------------
    // Playback events
    // ------------------------------------------------------------------

    /// Progress tick: detect the end of the active segment
    ///
    /// Hands off when the active handle reports its natural end, or earlier
    /// when a warmed segment is ready and at most `predictive_window_seconds`
    /// remain.
    pub fn time_update(&mut self) -> Option<FetchTicket> {
        if self.state != SyncState::Playing {
            return None;
        }
        if self.handles.active().has_ended() {
            return self.segment_ended();
        }

        let window = self.settings.predictive_window_seconds;
        if window <= 0.0 {
            return None;
        }
        let station = self.session.as_ref()?.station_name();
        self.preload.warmed(station)?;

        let remaining = self.active_duration()? - self.handles.active().position();
        if remaining <= window {
            debug!(station = %station, remaining, "Switching early to warmed segment");
            return self.segment_ended();
        }
        None
    }

    /// The active segment finished playing
    pub fn segment_ended(&mut self) -> Option<FetchTicket> {
        if self.state != SyncState::Playing {
            return None;
        }
        let station = self.session.as_ref()?.station_name().to_string();
        let ended = self.handles.active().source();

        if let Some(warmed) = self.preload.consume(&station) {
            self.handles.swap();
            self.handles.standby_mut().stop();

            match self.start_active(&warmed.address, 0.0) {
                Ok(()) => {
                    if let Some(session) = self.session.as_mut() {
                        session.clear_preloaded();
                    }
                    info!(station = %station, segment = %warmed.address, "Handed off to warmed segment");
                    return Some(self.ticket(&station, FetchReason::Refresh));
                }
                Err(err) => {
                    warn!(station = %station, "Warmed segment refused to start: {}", err);
                }
            }
        }

        warn!(station = %station, "Segment ended before the next one was ready");
        if let Some(session) = self.session.as_mut() {
            session.clear_preloaded();
        }
        self.ended_address = ended;
        self.state = SyncState::Handoff;
        self.now_playing.status = DisplayStatus::Buffering;
        Some(self.ticket(&station, FetchReason::Recovery))
    }

    // ------------------------------------------------------------------
    // Fetch completions
    // ------------------------------------------------------------------

    /// Deliver the outcome of a fetch
    ///
    /// Stale tickets are ignored. Errors are returned for reporting only; the
    /// state machine has already reacted to them.
    pub fn apply(&mut self, ticket: &FetchTicket, result: Result<SnapshotMap>) -> Result<()> {
        if !self.is_current(ticket) {
            debug!(
                station = %ticket.station,
                generation = ticket.generation,
                current = self.generation,
                "Discarding stale fetch result"
            );
            return Ok(());
        }

        match ticket.reason {
            FetchReason::TuneIn => self.apply_tune_in(result),
            FetchReason::Poll | FetchReason::Refresh => self.apply_poll(result),
            FetchReason::Recovery => self.apply_recovery(result),
        }
    }

    fn apply_tune_in(&mut self, result: Result<SnapshotMap>) -> Result<()> {
        if self.state != SyncState::Tuning {
            return Ok(());
        }
        let station = self.station_name();

        let outcome = result.and_then(|mut snapshots| {
            snapshots
                .remove(&station)
                .ok_or_else(|| Error::StationNotFound(station.clone()))
        });
        let snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(err) => return Err(self.fail_tune_in(&station, err)),
        };

        let start = (snapshot.current_segment.position_seconds - self.settings.buffer_seconds).max(0.0);
        if let Err(err) = self.start_active(&snapshot.current_segment.address, start) {
            self.handles.stop_all();
            return Err(self.fail_tune_in(&station, err));
        }

        info!(
            station = %station,
            segment = snapshot.current_segment_index,
            position = start,
            "Now playing {} by {}",
            snapshot.title,
            snapshot.author
        );
        self.state = SyncState::Playing;
        self.now_playing = NowPlaying::from_snapshot(&station, &snapshot, DisplayStatus::Live);
        self.warm_next(&snapshot);
        if let Some(session) = self.session.as_mut() {
            session.record_snapshot(snapshot);
        }
        Ok(())
    }

    fn fail_tune_in(&mut self, station: &str, err: Error) -> Error {
        self.state = SyncState::Idle;
        self.session = None;
        self.now_playing = NowPlaying::unavailable(station, err.to_string());
        err
    }

    fn apply_poll(&mut self, result: Result<SnapshotMap>) -> Result<()> {
        if !matches!(
            self.state,
            SyncState::Playing | SyncState::Paused | SyncState::Handoff
        ) {
            return Ok(());
        }
        let station = self.station_name();
        let snapshot = result?
            .remove(&station)
            .ok_or_else(|| Error::StationNotFound(station.clone()))?;

        let status = match self.state {
            SyncState::Paused => DisplayStatus::Paused,
            SyncState::Handoff => DisplayStatus::Buffering,
            _ => DisplayStatus::Live,
        };
        self.now_playing = NowPlaying::from_snapshot(&station, &snapshot, status);
        debug!(
            station = %station,
            segment = snapshot.current_segment_index,
            "{}",
            snapshot.status_line()
        );

        if self.state != SyncState::Handoff {
            self.refresh_preload(&snapshot);
            // An ended handle belongs to the next progress tick's hand-off
            if self.state == SyncState::Playing && !self.handles.active().has_ended() {
                self.correct_drift(&snapshot);
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.record_snapshot(snapshot);
        }
        Ok(())
    }

    fn apply_recovery(&mut self, result: Result<SnapshotMap>) -> Result<()> {
        if self.state != SyncState::Handoff {
            return Ok(());
        }
        let station = self.station_name();
        let snapshot = result?
            .remove(&station)
            .ok_or_else(|| Error::StationNotFound(station.clone()))?;

        let server = &snapshot.current_segment;
        let (target, start) = if self.ended_address.as_ref() == Some(&server.address) {
            match self.resolver.resolve_next(server, &snapshot)? {
                Some(next) => (next, 0.0),
                None => {
                    debug!(station = %station, "Server has not moved past the ended segment yet");
                    self.now_playing =
                        NowPlaying::from_snapshot(&station, &snapshot, DisplayStatus::Buffering);
                    if let Some(session) = self.session.as_mut() {
                        session.record_snapshot(snapshot);
                    }
                    return Ok(());
                }
            }
        } else {
            (
                server.address.clone(),
                (server.position_seconds - self.settings.buffer_seconds).max(0.0),
            )
        };

        self.start_active(&target, start)?;

        info!(station = %station, segment = %target, position = start, "Recovered after preload miss");
        self.ended_address = None;
        self.state = SyncState::Playing;
        self.now_playing = NowPlaying::from_snapshot(&station, &snapshot, DisplayStatus::Live);
        if target == snapshot.current_segment.address {
            self.warm_next(&snapshot);
        }
        if let Some(session) = self.session.as_mut() {
            session.record_snapshot(snapshot);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn ticket(&self, station: &str, reason: FetchReason) -> FetchTicket {
        FetchTicket {
            generation: self.generation,
            station: station.to_string(),
            reason,
        }
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.station_name() == ticket.station)
    }

    fn station_name(&self) -> String {
        self.session
            .as_ref()
            .map(|s| s.station_name().to_string())
            .unwrap_or_default()
    }

    fn cancel_session(&mut self) {
        self.handles.stop_all();
        self.preload.abandon();
        if let Some(mut session) = self.session.take() {
            session.clear_preloaded();
            session.deactivate();
        }
        self.ended_address = None;
    }

    /// Make `address` audible on the active handle from `start` seconds
    fn start_active(&mut self, address: &Url, start: f64) -> Result<()> {
        let active = self.handles.active_mut();
        if active.source().as_ref() != Some(address) {
            active.load(address)?;
        }
        active.seek(start);
        active.play()
    }

    fn active_duration(&self) -> Option<f64> {
        let active = self.handles.active();
        active
            .duration()
            .or_else(|| {
                let snapshot = self.session.as_ref()?.last_snapshot()?;
                let source = active.source()?;
                (snapshot.current_segment.address == source)
                    .then_some(snapshot.current_segment.duration_seconds)
            })
            .filter(|d| *d > 0.0)
    }

    fn warm_next(&mut self, snapshot: &TrackSnapshot) {
        match self.resolver.resolve_next(&snapshot.current_segment, snapshot) {
            Ok(Some(next)) => self.warm(next),
            Ok(None) => debug!(title = %snapshot.title, "Last segment of the track, nothing to warm"),
            Err(err) => warn!("Cannot derive the next segment address: {}", err),
        }
    }

    fn warm(&mut self, address: Url) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let playing = self.handles.active().source();
        match self.preload.warm(
            session.station_name(),
            &address,
            self.handles.standby_mut(),
            playing.as_ref(),
        ) {
            Ok(true) => session.mark_preloaded(address),
            Ok(false) => {}
            Err(err) => {
                session.clear_preloaded();
                warn!(
                    station = %session.station_name(),
                    segment = %address,
                    "Preload failed, retrying next poll: {}",
                    err
                );
            }
        }
    }

    fn refresh_preload(&mut self, snapshot: &TrackSnapshot) {
        let Some(playing) = self.handles.active().source() else {
            return;
        };
        let station = self.station_name();
        let server = &snapshot.current_segment.address;

        match self.resolver.relation(server, &playing) {
            SegmentRelation::Same => self.warm_next(snapshot),
            _ if self.preload.is_warmed(&station, server) => {}
            SegmentRelation::Behind => {}
            SegmentRelation::Ahead | SegmentRelation::OtherTrack | SegmentRelation::Unknown => {
                debug!(station = %station, segment = %server, "Server moved on, warming its segment");
                self.warm(server.clone());
            }
        }
    }

    fn correct_drift(&mut self, snapshot: &TrackSnapshot) {
        let server = &snapshot.current_segment;
        let active = self.handles.active_mut();
        if active.source().as_ref() != Some(&server.address) {
            return;
        }

        let local = active.position();
        let drift = local - server.position_seconds;
        if drift.abs() > self.settings.drift_tolerance_seconds {
            active.seek(server.position_seconds);
            info!(
                segment = snapshot.current_segment_index,
                local,
                server = server.position_seconds,
                "Corrected drift"
            );
        }
    }
}
