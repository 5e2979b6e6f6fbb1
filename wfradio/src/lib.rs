//! Wildflower Radio playback synchronization
//!
//! This crate keeps a local player in step with a Wildflower Radio station.
//! The backend plays every station "live" and publishes, once per request,
//! which segment of which track each station is at and how far into it. The
//! client joins mid-segment, warms the next segment on a second handle, and
//! swaps handles at the boundary so the stream stays gapless.
//!
//! # Features
//!
//! - **Position client**: one GET returns every station's track and segment
//! - **Segment addresses**: the next chunk's address is derived locally
//! - **Gapless hand-off**: `{active, standby}` handle pair, swapped at boundaries
//! - **Drift correction**: corrective seeks when the local position wanders
//! - **Background worker**: tokio task with poll and progress timers
//! - **Configuration extension**: every tunable lives in `config.yaml`
//! - **rodio** (feature): a playback handle that drives a real audio device
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wfradio::{
//!     MemoryHandle, PlaybackSynchronizer, PositionClient, SegmentAddressResolver, SyncSettings,
//!     SyncWorker,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(PositionClient::new()?);
//!     let sync = PlaybackSynchronizer::new(
//!         MemoryHandle::new(),
//!         MemoryHandle::new(),
//!         SegmentAddressResolver::new("Tracks")?,
//!         SyncSettings::default(),
//!     );
//!
//!     let (worker, handle) = SyncWorker::spawn(sync, client);
//!     handle.tune_in("Radio Wildflower").await?;
//!
//!     let mut updates = handle.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let view = updates.borrow().clone();
//!         println!("{} by {} [{} / {}]", view.title, view.author, view.elapsed, view.total);
//!     }
//!
//!     worker.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config_ext;
pub mod constants;
pub mod error;
pub mod handle;
pub mod models;
pub mod preload;
#[cfg(feature = "rodio")]
pub mod rodio_handle;
pub mod segment_address;
pub mod session;
pub mod synchronizer;
pub mod time_format;
pub mod worker;

pub use client::{ClientBuilder, PositionClient, PositionSource};
pub use config_ext::WildflowerConfigExt;
pub use error::{Error, Result};
pub use handle::{HandlePair, MemoryHandle, MemoryState, PlaybackHandle};
pub use models::{
    DisplayStatus, NowPlaying, SegmentSnapshot, SnapshotMap, StationInfo, StationListing,
    TrackSnapshot,
};
pub use preload::{PreloadController, WarmedSegment};
#[cfg(feature = "rodio")]
pub use rodio_handle::RodioHandle;
pub use segment_address::{AddressError, SegmentAddress, SegmentAddressResolver, SegmentRelation};
pub use session::StationSession;
pub use synchronizer::{FetchReason, FetchTicket, PlaybackSynchronizer, SyncSettings, SyncState};
pub use time_format::format_time;
pub use worker::{SyncWorker, SyncWorkerHandle, WorkerCommand};
