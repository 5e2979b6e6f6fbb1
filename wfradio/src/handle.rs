//! Playback handles
//!
//! The engine never decodes audio itself. It drives two handles onto the
//! platform media pipeline through [`PlaybackHandle`]: the *active* one is
//! audible, the *standby* one buffers the next segment silently. On hand-off
//! the pair is swapped, so neither handle is permanently "the next one".

use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// A media element able to play one segment address at a time
pub trait PlaybackHandle {
    /// Assign a source and start buffering it without playing
    fn load(&mut self, source: &Url) -> Result<()>;

    /// Currently assigned source
    fn source(&self) -> Option<Url>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Halt playback and drop the source
    fn stop(&mut self);

    /// Elapsed seconds in the current source
    fn position(&self) -> f64;

    /// Move the playhead without changing the play/pause state
    fn seek(&mut self, seconds: f64);

    /// Length of the current source, once the pipeline knows it
    fn duration(&self) -> Option<f64>;

    fn is_paused(&self) -> bool;

    /// Whether the source played through to its natural end
    fn has_ended(&self) -> bool;
}

/// The `{active, standby}` pair
#[derive(Debug)]
pub struct HandlePair<H> {
    active: H,
    standby: H,
}

impl<H: PlaybackHandle> HandlePair<H> {
    pub fn new(active: H, standby: H) -> Self {
        Self { active, standby }
    }

    pub fn active(&self) -> &H {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut H {
        &mut self.active
    }

    pub fn standby(&self) -> &H {
        &self.standby
    }

    pub fn standby_mut(&mut self) -> &mut H {
        &mut self.standby
    }

    /// Promote the standby handle; the former active one becomes standby
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.active, &mut self.standby);
    }

    pub fn stop_all(&mut self) {
        self.active.stop();
        self.standby.stop();
    }
}

// ============================================================================
// In-memory handle
// ============================================================================

/// Observable state of a [`MemoryHandle`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    pub source: Option<Url>,
    pub position: f64,
    pub duration: Option<f64>,
    pub playing: bool,
    pub ended: bool,
    /// Every source ever loaded, in order
    pub loads: Vec<Url>,
    pub play_calls: usize,
    pub seeks: Vec<f64>,
    pub fail_loads: bool,
}

/// A handle that simulates a media element in memory
///
/// Clones share state, so a caller can hand one clone to the engine and keep
/// another to advance time or inspect what the engine did. Used for headless
/// runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandle {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current state
    pub fn state(&self) -> MemoryState {
        self.lock().clone()
    }

    /// Pretend the pipeline learned the source length
    pub fn set_duration(&self, duration: Option<f64>) {
        self.lock().duration = duration;
    }

    /// Make subsequent `load` calls fail (or succeed again)
    pub fn fail_loads(&self, fail: bool) {
        self.lock().fail_loads = fail;
    }

    /// Move the playhead forward as if `seconds` of audio were played
    pub fn advance(&self, seconds: f64) {
        let mut state = self.lock();
        if !state.playing {
            return;
        }
        state.position += seconds;
        if let Some(duration) = state.duration {
            if state.position >= duration {
                state.position = duration;
                state.playing = false;
                state.ended = true;
            }
        }
    }

    /// Reach the natural end of the source
    pub fn finish(&self) {
        let mut state = self.lock();
        if let Some(duration) = state.duration {
            state.position = duration;
        }
        state.playing = false;
        state.ended = true;
    }
}

impl PlaybackHandle for MemoryHandle {
    fn load(&mut self, source: &Url) -> Result<()> {
        let mut state = self.lock();
        if state.fail_loads {
            return Err(Error::playback(format!("cannot load {}", source)));
        }
        state.source = Some(source.clone());
        state.position = 0.0;
        state.duration = None;
        state.playing = false;
        state.ended = false;
        state.loads.push(source.clone());
        Ok(())
    }

    fn source(&self) -> Option<Url> {
        self.lock().source.clone()
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.source.is_none() {
            return Err(Error::playback("no source loaded"));
        }
        state.playing = true;
        state.ended = false;
        state.play_calls += 1;
        Ok(())
    }

    fn pause(&mut self) {
        self.lock().playing = false;
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.source = None;
        state.position = 0.0;
        state.duration = None;
        state.playing = false;
        state.ended = false;
    }

    fn position(&self) -> f64 {
        self.lock().position
    }

    fn seek(&mut self, seconds: f64) {
        let mut state = self.lock();
        let position = seconds.max(0.0);
        state.position = position;
        state.ended = false;
        state.seeks.push(position);
    }

    fn duration(&self) -> Option<f64> {
        self.lock().duration
    }

    fn is_paused(&self) -> bool {
        !self.lock().playing
    }

    fn has_ended(&self) -> bool {
        self.lock().ended
    }
}
