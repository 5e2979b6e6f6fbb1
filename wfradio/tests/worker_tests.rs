//! End-to-end tests: worker + position client + in-memory handles

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wfradio::{
    DisplayStatus, MemoryHandle, PlaybackSynchronizer, PositionClient, SegmentAddressResolver,
    SyncSettings, SyncWorker, SyncWorkerHandle,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STATION: &str = "Radio Wildflower";

fn chunk(n: u32) -> String {
    format!("https://cdn.example/o/Tracks%2FMeadow%2FChunk_{n}.mp3?alt=media&token=0a1b")
}

fn positions(segment: u32, position: f64) -> serde_json::Value {
    json!({
        STATION: {
            "track": {
                "title": "Meadow",
                "author": "Mindseye",
                "duration": 120.0,
                "position": 30.0 * (segment - 1) as f64 + position,
                "numSegments": 4,
                "numCurrentSegment": segment
            },
            "currentSegment": {
                "SRC": chunk(segment),
                "duration": 30.0,
                "position": position
            }
        }
    })
}

fn fast_settings() -> SyncSettings {
    SyncSettings {
        poll_interval: Duration::from_millis(50),
        progress_interval: Duration::from_millis(20),
        ..SyncSettings::default()
    }
}

struct Rig {
    worker: SyncWorker,
    handle: SyncWorkerHandle,
    a: MemoryHandle,
    b: MemoryHandle,
}

fn spawn_worker(server: &MockServer) -> Rig {
    spawn_worker_with(server, fast_settings())
}

fn spawn_worker_with(server: &MockServer, settings: SyncSettings) -> Rig {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let client = PositionClient::builder()
        .base_url(server.uri())
        .build()
        .unwrap();
    let a = MemoryHandle::new();
    let b = MemoryHandle::new();
    let sync = PlaybackSynchronizer::new(
        a.clone(),
        b.clone(),
        SegmentAddressResolver::new("Tracks").unwrap(),
        settings,
    );
    let (worker, handle) = SyncWorker::spawn(sync, Arc::new(client));
    Rig {
        worker,
        handle,
        a,
        b,
    }
}

async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn test_tune_in_plays_and_warms() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAllTrackInformation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(positions(2, 17.5)))
        .mount(&mock_server)
        .await;

    let rig = spawn_worker(&mock_server);
    let mut updates = rig.handle.subscribe();
    rig.handle.tune_in(STATION).await.unwrap();

    wait_for("live status", || rig.handle.now_playing().status == DisplayStatus::Live).await;
    assert!(updates.has_changed().unwrap());

    let a = rig.a.state();
    assert_eq!(a.source, Some(Url::parse(&chunk(2)).unwrap()));
    assert!(a.playing);
    assert_eq!(a.seeks.first(), Some(&14.5));
    assert_eq!(rig.b.state().loads, vec![Url::parse(&chunk(3)).unwrap()]);

    let view = rig.handle.now_playing();
    assert_eq!(view.title, "Meadow");
    assert_eq!(view.elapsed, "0:47");
    assert_eq!(view.total, "2:00");
    assert_eq!(view.segment, Some((2, 4)));

    // The first poll pulls the buffered start back onto the server position
    wait_for("drift correction", || rig.a.state().position == 17.5).await;
    assert_eq!(rig.a.state().play_calls, 1);

    rig.handle.shutdown().await.unwrap();
    rig.worker.wait().await.unwrap();
    assert_eq!(rig.a.state().source, None);
}

#[tokio::test]
async fn test_handoff_at_segment_end() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAllTrackInformation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(positions(2, 29.0)))
        .mount(&mock_server)
        .await;

    let rig = spawn_worker(&mock_server);
    rig.handle.tune_in(STATION).await.unwrap();
    wait_for("standby warmed", || !rig.b.state().loads.is_empty()).await;
    // A drift seek after the end would rewind the finished handle
    wait_for("drift correction", || rig.a.state().position == 29.0).await;

    rig.a.finish();
    wait_for("standby promoted", || rig.b.state().playing).await;

    let b = rig.b.state();
    assert_eq!(b.source, Some(Url::parse(&chunk(3)).unwrap()));
    assert_eq!(b.seeks.first(), Some(&0.0));
    assert_eq!(rig.handle.now_playing().status, DisplayStatus::Live);

    rig.handle.shutdown().await.unwrap();
    rig.worker.wait().await.unwrap();
}

#[tokio::test]
async fn test_unknown_station_is_unavailable() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAllTrackInformation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(positions(1, 3.0)))
        .mount(&mock_server)
        .await;

    let rig = spawn_worker(&mock_server);
    rig.handle.tune_in("Alarm Hub").await.unwrap();

    wait_for("unavailable status", || {
        rig.handle.now_playing().status == DisplayStatus::Unavailable
    })
    .await;
    let view = rig.handle.now_playing();
    assert_eq!(view.station.as_deref(), Some("Alarm Hub"));
    assert!(view.error.unwrap().contains("Alarm Hub"));
    assert!(rig.a.state().loads.is_empty());

    rig.handle.shutdown().await.unwrap();
    rig.worker.wait().await.unwrap();
}

#[tokio::test]
async fn test_poll_failures_keep_playing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAllTrackInformation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(positions(1, 5.0)))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/getAllTrackInformation"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let rig = spawn_worker(&mock_server);
    rig.handle.tune_in(STATION).await.unwrap();
    wait_for("live status", || rig.handle.now_playing().status == DisplayStatus::Live).await;

    // Let a few failing polls go by
    tokio::time::sleep(Duration::from_millis(300)).await;
    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.len() > 1);

    assert_eq!(rig.handle.now_playing().status, DisplayStatus::Live);
    let a = rig.a.state();
    assert!(a.playing);
    assert_eq!(a.seeks, vec![2.0]);

    rig.handle.shutdown().await.unwrap();
    rig.worker.wait().await.unwrap();
}

#[tokio::test]
async fn test_pause_resume_and_stop() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAllTrackInformation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(positions(1, 10.0)))
        .mount(&mock_server)
        .await;

    let rig = spawn_worker(&mock_server);
    rig.handle.tune_in(STATION).await.unwrap();
    wait_for("live status", || rig.handle.now_playing().status == DisplayStatus::Live).await;

    rig.handle.pause().await.unwrap();
    wait_for("paused status", || rig.handle.now_playing().status == DisplayStatus::Paused).await;
    assert!(!rig.a.state().playing);

    rig.handle.resume().await.unwrap();
    wait_for("resumed", || rig.a.state().playing).await;

    rig.handle.stop().await.unwrap();
    wait_for("idle status", || rig.handle.now_playing().status == DisplayStatus::Idle).await;
    assert_eq!(rig.a.state().source, None);
    assert_eq!(rig.b.state().source, None);

    rig.handle.shutdown().await.unwrap();
    rig.worker.wait().await.unwrap();
    assert!(rig.handle.tune_in(STATION).await.is_err());
}

#[tokio::test]
async fn test_zero_intervals_still_run() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAllTrackInformation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(positions(1, 10.0)))
        .mount(&mock_server)
        .await;

    let settings = SyncSettings {
        poll_interval: Duration::ZERO,
        progress_interval: Duration::ZERO,
        ..SyncSettings::default()
    };
    let rig = spawn_worker_with(&mock_server, settings);
    rig.handle.tune_in(STATION).await.unwrap();
    wait_for("live status", || rig.handle.now_playing().status == DisplayStatus::Live).await;
    assert!(rig.a.state().playing);

    rig.handle.shutdown().await.unwrap();
    rig.worker.wait().await.unwrap();
}
