//! Example: listen to a Wildflower station on the default audio device
//!
//! Run with: cargo run -p wfradio --features rodio --example listen -- "Radio Wildflower"

use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wfconfig::get_config;
use wfradio::{
    PlaybackSynchronizer, RodioHandle, SegmentAddressResolver, SyncWorker, WildflowerConfigExt,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = get_config();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().unwrap_or_default().to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let station = env::args()
        .nth(1)
        .unwrap_or_else(|| "Radio Wildflower".to_string());

    // Must outlive both handles
    let stream = rodio::OutputStreamBuilder::open_default_stream()?;

    let client = config.position_client_builder()?.build()?;
    let http = client.http_client().clone();
    let sync = PlaybackSynchronizer::new(
        RodioHandle::new(stream.mixer().clone(), http.clone()),
        RodioHandle::new(stream.mixer().clone(), http),
        SegmentAddressResolver::new(config.get_storage_root()?)?,
        config.get_sync_settings()?,
    );

    let (worker, handle) = SyncWorker::spawn(sync, Arc::new(client));
    handle.tune_in(station.clone()).await?;
    println!("Tuning in to {} (Ctrl-C to quit)", station);

    let mut updates = handle.subscribe();
    let follow = async {
        let mut last_title = String::new();
        while updates.changed().await.is_ok() {
            let view = updates.borrow_and_update().clone();
            if view.title != last_title && !view.title.is_empty() {
                println!("Now playing: {} by {} ({})", view.title, view.author, view.total);
                last_title = view.title;
            }
            if let Some(error) = view.error {
                println!("{}: {}", station, error);
                break;
            }
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
