//! Playback handle backed by a rodio sink
//!
//! Each `load` downloads the segment in a background task and creates a
//! fresh paused [`Sink`] on the shared mixer. The decoded audio is appended
//! the first time the handle is touched after the download completed, so the
//! synchronizer never blocks on the network.
//!
//! The caller owns the [`rodio::OutputStream`] and must keep it alive for as
//! long as the handles are used.

use crate::error::{Error, Result};
use crate::handle::PlaybackHandle;
use rodio::mixer::Mixer;
use rodio::{Decoder, Sink, Source};
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;

pub struct RodioHandle {
    mixer: Mixer,
    http: reqwest::Client,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    source: Option<Url>,
    sink: Option<Sink>,
    download: Option<oneshot::Receiver<Result<Vec<u8>>>>,
    /// Audio appended to the sink
    ready: bool,
    failed: bool,
    duration: Option<f64>,
    play_requested: bool,
    /// Seek requested before the audio was ready
    seek_to: Option<f64>,
}

impl Slot {
    /// Pick up a finished download
    fn settle(&mut self) {
        let Some(download) = self.download.as_mut() else {
            return;
        };
        let bytes = match download.try_recv() {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) => {
                tracing::warn!(segment = ?self.source.as_ref().map(Url::as_str), "Segment download failed: {}", err);
                self.download = None;
                self.failed = true;
                return;
            }
            Err(oneshot::error::TryRecvError::Empty) => return,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.download = None;
                self.failed = true;
                return;
            }
        };
        self.download = None;

        let decoder = match Decoder::new(Cursor::new(bytes)) {
            Ok(decoder) => decoder,
            Err(err) => {
                tracing::warn!("Cannot decode segment: {}", err);
                self.failed = true;
                return;
            }
        };
        self.duration = decoder.total_duration().map(|d| d.as_secs_f64());

        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        sink.append(decoder);
        if let Some(seconds) = self.seek_to.take() {
            if let Err(err) = sink.try_seek(Duration::from_secs_f64(seconds)) {
                tracing::debug!("Deferred seek failed: {}", err);
            }
        }
        if self.play_requested {
            sink.play();
        }
        self.ready = true;
    }
}

impl RodioHandle {
    /// Handle playing through `mixer`, downloading segments with `http`
    pub fn new(mixer: Mixer, http: reqwest::Client) -> Self {
        Self {
            mixer,
            http,
            slot: Mutex::new(Slot::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.settle();
        slot
    }
}

impl PlaybackHandle for RodioHandle {
    fn load(&mut self, source: &Url) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::playback(format!("no tokio runtime to download segments: {}", e)))?;

        let sink = Sink::connect_new(&self.mixer);
        sink.pause();

        let (tx, rx) = oneshot::channel();
        let http = self.http.clone();
        let url = source.clone();
        runtime.spawn(async move {
            let result = async {
                let response = http.get(url).send().await?.error_for_status()?;
                Ok::<_, Error>(response.bytes().await?.to_vec())
            }
            .await;
            let _ = tx.send(result);
        });

        let mut slot = self.lock();
        if let Some(old) = slot.sink.take() {
            old.stop();
        }
        *slot = Slot {
            source: Some(source.clone()),
            sink: Some(sink),
            download: Some(rx),
            ..Slot::default()
        };
        Ok(())
    }

    fn source(&self) -> Option<Url> {
        self.lock().source.clone()
    }

    fn play(&mut self) -> Result<()> {
        let mut slot = self.lock();
        if slot.source.is_none() {
            return Err(Error::playback("no source loaded"));
        }
        slot.play_requested = true;
        if slot.ready {
            if let Some(sink) = slot.sink.as_ref() {
                sink.play();
            }
        }
        Ok(())
    }

    fn pause(&mut self) {
        let mut slot = self.lock();
        slot.play_requested = false;
        if let Some(sink) = slot.sink.as_ref() {
            sink.pause();
        }
    }

    fn stop(&mut self) {
        let mut slot = self.lock();
        if let Some(sink) = slot.sink.take() {
            sink.stop();
        }
        *slot = Slot::default();
    }

    fn position(&self) -> f64 {
        let slot = self.lock();
        match slot.sink.as_ref() {
            Some(sink) if slot.ready => sink.get_pos().as_secs_f64(),
            _ => slot.seek_to.unwrap_or(0.0),
        }
    }

    fn seek(&mut self, seconds: f64) {
        let mut slot = self.lock();
        let seconds = seconds.max(0.0);
        if slot.ready {
            if let Some(sink) = slot.sink.as_ref() {
                if let Err(err) = sink.try_seek(Duration::from_secs_f64(seconds)) {
                    tracing::warn!("Seek to {:.1}s failed: {}", seconds, err);
                }
                return;
            }
        }
        slot.seek_to = Some(seconds);
    }

    fn duration(&self) -> Option<f64> {
        self.lock().duration
    }

    fn is_paused(&self) -> bool {
        !self.lock().play_requested
    }

    fn has_ended(&self) -> bool {
        let slot = self.lock();
        if !slot.play_requested {
            return false;
        }
        slot.failed || (slot.ready && slot.sink.as_ref().map_or(true, Sink::empty))
    }
}
