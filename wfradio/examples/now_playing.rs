//! Example: show what every Wildflower station is playing, then follow one
//!
//! Run with: cargo run -p wfradio --example now_playing
//! Or follow a given station: cargo run -p wfradio --example now_playing -- "Hue Jazz"
//!
//! Playback goes to in-memory handles, so nothing is audible; see the
//! `listen` example for real output.

use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wfconfig::get_config;
use wfradio::{
    MemoryHandle, PlaybackSynchronizer, SegmentAddressResolver, SyncWorker, WildflowerConfigExt,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = get_config();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().unwrap_or_default().to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = config.position_client_builder()?.build()?;

    let stations = match config.get_cached_stations()? {
        Some(stations) => stations,
        None => {
            let stations = client.fetch_stations().await.unwrap_or_default();
            if !stations.is_empty() {
                config.set_cached_stations(&stations)?;
            }
            stations
        }
    };

    let snapshots = client.fetch_all().await?;
    println!("=== Stations ({}) ===", snapshots.len().max(stations.len()));
    for listing in wfradio::models::merge_availability(stations, &snapshots) {
        let marker = if listing.available { "on air" } else { "unavailable" };
        println!("  {} [{}]", listing.info.name, marker);
    }
    println!();
    let mut names: Vec<_> = snapshots.keys().cloned().collect();
    names.sort();
    for name in &names {
        println!("{}: {}", name, snapshots[name].status_line());
    }

    let station = env::args()
        .nth(1)
        .or_else(|| names.first().cloned())
        .ok_or("no station on air")?;
    println!("\nFollowing {}...\n", station);

    let sync = PlaybackSynchronizer::new(
        MemoryHandle::new(),
        MemoryHandle::new(),
        SegmentAddressResolver::new(config.get_storage_root()?)?,
        config.get_sync_settings()?,
    );
    let (worker, handle) = SyncWorker::spawn(sync, Arc::new(client));
    handle.tune_in(station).await?;

    let mut updates = handle.subscribe();
    let follow = async {
        while updates.changed().await.is_ok() {
            let view = updates.borrow_and_update().clone();
            let segment = view
                .segment
                .map(|(i, n)| format!("segment {} of {}", i, n))
                .unwrap_or_default();
            println!(
                "[{:?}] {} by {}  {} / {}  {}",
                view.status, view.title, view.author, view.elapsed, view.total, segment
            );
        }
    };

    tokio::select! {
        _ = follow => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    handle.shutdown().await?;
    worker.wait().await?;
    Ok(())
}
