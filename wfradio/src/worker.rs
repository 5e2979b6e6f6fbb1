//! Background worker driving a [`PlaybackSynchronizer`].
//!
//! The worker owns the synchronizer and serializes everything that touches
//! it through one `select!` loop: user commands, the poll timer, the progress
//! timer and completed fetches. Fetches run in their own tasks and never
//! touch playback state; their results come back through a channel and are
//! applied in order.

use crate::client::PositionSource;
use crate::error::{Error, Result};
use crate::handle::PlaybackHandle;
use crate::models::{NowPlaying, SnapshotMap};
use crate::synchronizer::{FetchTicket, PlaybackSynchronizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Shortest timer period the worker accepts
const MIN_TICK: Duration = Duration::from_millis(1);

/// Commands sent to the background worker.
#[derive(Debug)]
pub enum WorkerCommand {
    TuneIn { station: String },
    Pause,
    Resume,
    Stop,
    Shutdown,
}

/// Handle to the spawned worker task.
pub struct SyncWorker {
    join_handle: JoinHandle<()>,
}

/// Cloneable front-end used to control a running worker
#[derive(Debug, Clone)]
pub struct SyncWorkerHandle {
    tx: mpsc::Sender<WorkerCommand>,
    now_playing: watch::Receiver<NowPlaying>,
}

struct FetchDone {
    ticket: FetchTicket,
    result: Result<SnapshotMap>,
    /// Issued by the poll timer
    polled: bool,
}

impl SyncWorker {
    /// Start the worker; timer periods come from the synchronizer settings
    pub fn spawn<H>(
        synchronizer: PlaybackSynchronizer<H>,
        source: Arc<dyn PositionSource>,
    ) -> (Self, SyncWorkerHandle)
    where
        H: PlaybackHandle + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(32);
        let (now_playing_tx, now_playing_rx) = watch::channel(synchronizer.now_playing().clone());

        let join_handle = tokio::spawn(async move {
            info!("Starting sync worker");

            let settings = synchronizer.settings().clone();
            let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel();
            let mut state = WorkerState {
                sync: synchronizer,
                source,
                fetch_tx,
                now_playing: now_playing_tx,
                poll_in_flight: false,
                shutdown: false,
            };

            // interval() panics on a zero period
            let mut poll_timer = interval(settings.poll_interval.max(MIN_TICK));
            poll_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut progress_timer = interval(settings.progress_interval.max(MIN_TICK));
            progress_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    cmd = rx.recv() => match cmd {
                        Some(cmd) => state.handle_command(cmd),
                        // Every handle dropped
                        None => break,
                    },
                    _ = poll_timer.tick() => state.on_poll_tick(),
                    _ = progress_timer.tick() => state.on_progress_tick(),
                    Some(done) = fetch_rx.recv() => state.on_fetch(done),
                }

                state.publish();
                if state.shutdown {
                    break;
                }
            }

            state.sync.stop();
            state.publish();
            info!("Sync worker stopped");
        });

        (
            Self { join_handle },
            SyncWorkerHandle {
                tx,
                now_playing: now_playing_rx,
            },
        )
    }

    pub async fn wait(self) -> Result<()> {
        if let Err(err) = self.join_handle.await {
            if err.is_cancelled() {
                warn!("Sync worker task cancelled: {err}");
                return Ok(());
            }
            return Err(Error::other(format!("Sync worker join error: {}", err)));
        }
        Ok(())
    }
}

impl SyncWorkerHandle {
    async fn send(&self, cmd: WorkerCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| Error::other("sync worker is not running"))
    }

    pub async fn tune_in(&self, station: impl Into<String>) -> Result<()> {
        self.send(WorkerCommand::TuneIn {
            station: station.into(),
        })
        .await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(WorkerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(WorkerCommand::Resume).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(WorkerCommand::Stop).await
    }

    /// Stop playback and end the worker task
    pub async fn shutdown(&self) -> Result<()> {
        self.send(WorkerCommand::Shutdown).await
    }

    /// Receiver notified whenever the now-playing view changes
    pub fn subscribe(&self) -> watch::Receiver<NowPlaying> {
        self.now_playing.clone()
    }

    /// Latest published view
    pub fn now_playing(&self) -> NowPlaying {
        self.now_playing.borrow().clone()
    }
}

struct WorkerState<H> {
    sync: PlaybackSynchronizer<H>,
    source: Arc<dyn PositionSource>,
    fetch_tx: mpsc::UnboundedSender<FetchDone>,
    now_playing: watch::Sender<NowPlaying>,
    poll_in_flight: bool,
    shutdown: bool,
}

impl<H: PlaybackHandle> WorkerState<H> {
    fn handle_command(&mut self, cmd: WorkerCommand) {
        debug!("Worker command: {:?}", cmd);
        match cmd {
            WorkerCommand::TuneIn { station } => {
                let ticket = self.sync.tune_in(&station);
                self.dispatch(ticket, false);
            }
            WorkerCommand::Pause => self.sync.pause(),
            WorkerCommand::Resume => {
                if let Err(err) = self.sync.resume() {
                    error!("Cannot resume playback: {}", err);
                }
            }
            WorkerCommand::Stop => self.sync.stop(),
            WorkerCommand::Shutdown => self.shutdown = true,
        }
    }

    fn on_poll_tick(&mut self) {
        if self.poll_in_flight {
            debug!("Previous poll still in flight, skipping tick");
            return;
        }
        if let Some(ticket) = self.sync.poll() {
            self.poll_in_flight = true;
            self.dispatch(ticket, true);
        }
    }

    fn on_progress_tick(&mut self) {
        if let Some(ticket) = self.sync.time_update() {
            self.dispatch(ticket, false);
        }
    }

    fn on_fetch(&mut self, done: FetchDone) {
        if done.polled {
            self.poll_in_flight = false;
        }
        let FetchDone { ticket, result, .. } = done;
        if let Err(err) = self.sync.apply(&ticket, result) {
            if err.is_network() {
                warn!(
                    station = %ticket.station,
                    generation = ticket.generation,
                    "Position fetch failed, skipping this cycle: {}",
                    err
                );
            } else {
                warn!(
                    station = %ticket.station,
                    generation = ticket.generation,
                    "Cannot apply {:?} result: {}",
                    ticket.reason,
                    err
                );
            }
        }
    }

    /// Run the fetch for `ticket` in its own task
    fn dispatch(&self, ticket: FetchTicket, polled: bool) {
        let source = Arc::clone(&self.source);
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_all().await;
            // The worker may be gone; nothing left to inform
            let _ = tx.send(FetchDone {
                ticket,
                result,
                polled,
            });
        });
    }

    fn publish(&self) {
        let current = self.sync.now_playing();
        self.now_playing.send_if_modified(|published| {
            if *published != *current {
                *published = current.clone();
                true
            } else {
                false
            }
        });
    }
}
