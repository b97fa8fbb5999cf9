// Integration tests for playback sessions
// These drive a simulated player, the trigger session and an overlay together
// on a paused tokio clock.

use async_trait::async_trait;
use common::errors::SessionError;
use common::models::{TriggerFired, TriggerPoint};
use common::playback::{PlaybackControl, SimulatedPlayer, SimulatedPlayerConfig};
use common::progress::{ProgressCheckpoint, ProgressSink, ProgressTracker};
use common::config::ProgressConfig;
use common::trigger::{PlaybackSession, SessionHandle, SessionSummary, TriggerScheduler};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const OVERLAY_HOLD: Duration = Duration::from_secs(2);

fn player(duration_seconds: f64) -> Arc<SimulatedPlayer> {
    SimulatedPlayer::spawn(SimulatedPlayerConfig {
        tick_interval: Duration::from_millis(250),
        duration_seconds,
        playback_rate: 1.0,
    })
}

/// Overlay that records every event, holds playback, then resumes it
fn spawn_overlay(
    handle: &SessionHandle,
    player: Arc<SimulatedPlayer>,
) -> JoinHandle<Vec<TriggerFired>> {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Ok(event) = events.recv().await {
            seen.push(event);
            tokio::time::sleep(OVERLAY_HOLD).await;
            if player.is_disposed() || player.is_ended() {
                continue;
            }
            player.resume().unwrap();
        }
        seen
    })
}

async fn run_session(
    player: &Arc<SimulatedPlayer>,
    points: Vec<TriggerPoint>,
) -> (SessionSummary, Vec<TriggerFired>) {
    let playback: Arc<dyn PlaybackControl> = player.clone();
    let scheduler = TriggerScheduler::with_default_tolerance(points, playback).unwrap();
    let session = PlaybackSession::new(scheduler, player.subscribe_time());
    let handle = session.handle();
    let overlay = spawn_overlay(&handle, player.clone());
    drop(handle);

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    player.resume().unwrap();
    let summary = session.run(shutdown_rx).await;
    let events = overlay.await.unwrap();
    (summary, events)
}

#[tokio::test(start_paused = true)]
async fn test_full_playback_fires_every_trigger_in_order() {
    let player = player(400.0);

    let (summary, events) = run_session(&player, TriggerPoint::default_points()).await;

    let ids: Vec<&str> = events.iter().map(|e| e.point.payload_id.as_str()).collect();
    assert_eq!(ids, vec!["AD_001", "Q_987", "AD_002"]);
    for event in &events {
        let offset = event.point.time_offset_seconds;
        assert!(event.current_time_seconds >= offset - 0.5);
        assert!(event.current_time_seconds < offset + 0.5);
        assert_eq!(event.session_id, summary.session_id);
    }

    assert_eq!(summary.fired, 3);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.last_time_seconds, 400.0);
    assert!(player.is_ended());
}

#[tokio::test(start_paused = true)]
async fn test_trigger_pauses_playback_until_overlay_resumes() {
    let player = player(60.0);
    let playback: Arc<dyn PlaybackControl> = player.clone();
    let scheduler =
        TriggerScheduler::with_default_tolerance(vec![TriggerPoint::trivia(10.0, "Q_1")], playback)
            .unwrap();
    let session = PlaybackSession::new(scheduler, player.subscribe_time());
    let mut events = session.handle().subscribe();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    player.resume().unwrap();
    let task = tokio::spawn(session.run(shutdown_rx));

    let fired = events.recv().await.unwrap();
    assert_eq!(fired.point.payload_id, "Q_1");
    assert!(!player.is_playing());

    let paused_at = player.current_time();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(player.current_time(), paused_at);

    player.resume().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(player.current_time() > paused_at);

    shutdown_tx.send(()).unwrap();
    let summary = task.await.unwrap();
    assert_eq!(summary.fired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_past_trigger_skips_it() {
    let player = player(200.0);
    player.seek(40.0).unwrap();

    let (summary, events) = run_session(
        &player,
        vec![TriggerPoint::ad(30.0, "AD_001"), TriggerPoint::trivia(125.0, "Q_987")],
    )
    .await;

    let ids: Vec<&str> = events.iter().map(|e| e.point.payload_id.as_str()).collect();
    assert_eq!(ids, vec!["Q_987"]);
    assert_eq!(summary.fired, 1);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_replay_after_reset_fires_again() {
    let player = player(60.0);
    let playback: Arc<dyn PlaybackControl> = player.clone();
    let scheduler = TriggerScheduler::with_default_tolerance(
        vec![TriggerPoint::ad(30.0, "AD_001")],
        playback,
    )
    .unwrap();
    let session = PlaybackSession::new(scheduler, player.subscribe_time());
    let handle = session.handle();

    let overlay_player = player.clone();
    let mut events = handle.subscribe();
    // The handle keeps the event channel open, so it is released after use
    let mut overlay_handle = Some(handle);
    let overlay = tokio::spawn(async move {
        let mut count = 0;
        while let Ok(_event) = events.recv().await {
            count += 1;
            if let Some(handle) = overlay_handle.take() {
                // Rewind to the start and replay the session
                handle.reset().await.unwrap();
                overlay_player.seek(0.0).unwrap();
            }
            overlay_player.resume().unwrap();
        }
        count
    });

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    player.resume().unwrap();
    let summary = session.run(shutdown_rx).await;

    assert_eq!(overlay.await.unwrap(), 2);
    assert_eq!(summary.fired, 1);
    assert!(player.is_ended());
}

#[tokio::test(start_paused = true)]
async fn test_dispose_ends_session() {
    let player = player(400.0);
    let playback: Arc<dyn PlaybackControl> = player.clone();
    let scheduler =
        TriggerScheduler::with_default_tolerance(TriggerPoint::default_points(), playback).unwrap();
    let session = PlaybackSession::new(scheduler, player.subscribe_time());
    let mut events = session.handle().subscribe();

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    player.resume().unwrap();
    let task = tokio::spawn(session.run(shutdown_rx));

    events.recv().await.unwrap();
    player.dispose();

    let summary = task.await.unwrap();
    assert_eq!(summary.fired, 1);
    assert_eq!(summary.pending, 2);
    assert_eq!(summary.skipped, 0);
}

#[derive(Default)]
struct RecordingSink {
    saved: Mutex<Vec<ProgressCheckpoint>>,
    trivia_ready: Mutex<u32>,
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn save(&self, checkpoint: &ProgressCheckpoint) -> Result<(), SessionError> {
        self.saved.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }

    async fn trivia_ready(&self, _content_id: &str) -> Result<(), SessionError> {
        *self.trivia_ready.lock().unwrap() += 1;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_progress_tracked_alongside_triggers() {
    let player = player(100.0);
    let sink = Arc::new(RecordingSink::default());
    let tracker = ProgressTracker::new("oceans", ProgressConfig::default(), 100.0);
    let progress = tokio::spawn(tracker.track(player.subscribe_time(), sink.clone()));

    let (summary, events) = run_session(&player, vec![TriggerPoint::trivia(50.0, "Q_1")]).await;
    progress.await.unwrap().unwrap();

    assert_eq!(summary.fired, 1);
    assert_eq!(events.len(), 1);

    let saved = sink.saved.lock().unwrap();
    assert!(saved.len() >= 19);
    assert!(saved
        .windows(2)
        .all(|w| w[1].progress_seconds >= w[0].progress_seconds + 5));
    let last = saved.last().unwrap();
    assert_eq!(last.progress_seconds, 100);
    assert!(last.completed);
    assert!(saved.iter().filter(|c| c.completed).all(|c| c.progress_seconds >= 95));
    assert_eq!(*sink.trivia_ready.lock().unwrap(), 1);
}

#[test]
fn test_trigger_list_from_json_drives_scheduler() {
    let json = serde_json::json!([
        {"time": 350, "type": "ad", "data_id": "AD_002"},
        {"time": 30, "type": "ad", "data_id": "AD_001"},
        {"time": 125, "type": "trivia", "data_id": "Q_987"}
    ])
    .to_string();
    let points = TriggerPoint::list_from_json(&json).unwrap();

    struct NoopPlayer;
    impl PlaybackControl for NoopPlayer {
        fn current_time(&self) -> f64 {
            0.0
        }
        fn pause(&self) -> Result<(), common::errors::PlaybackError> {
            Ok(())
        }
        fn resume(&self) -> Result<(), common::errors::PlaybackError> {
            Ok(())
        }
        fn is_disposed(&self) -> bool {
            false
        }
    }

    let mut scheduler =
        TriggerScheduler::with_default_tolerance(points, Arc::new(NoopPlayer)).unwrap();
    let fired = scheduler.on_time_advanced(30.2).unwrap();
    assert_eq!(fired.index, 1);
    assert_eq!(fired.point.payload_id, "AD_001");
    assert!(scheduler.points()[1].fired());
    assert!(!scheduler.points()[0].fired());
}
