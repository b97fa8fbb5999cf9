// Scheduler binary entry point: runs one playback session with trigger overlays

use anyhow::Context;
use chrono::Utc;
use common::config::Settings;
use common::models::TriggerFired;
use common::playback::{PlaybackControl, SimulatedPlayer, SimulatedPlayerConfig};
use common::progress::{LogProgressSink, ProgressCheckpoint, ProgressTracker};
use common::telemetry;
use common::trigger::{PlaybackSession, TriggerScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(&settings.observability)?;

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    info!(
        content_id = %settings.player.content_id,
        trigger_count = settings.triggers.len(),
        tolerance_seconds = settings.player.tolerance_seconds,
        "Starting Krittics trigger scheduler"
    );

    let player = SimulatedPlayer::spawn(SimulatedPlayerConfig::from(&settings.player));
    let playback: Arc<dyn PlaybackControl> = player.clone();

    // Continue watching from a saved position, if any
    let mut tracker = ProgressTracker::new(
        settings.player.content_id.clone(),
        settings.progress.clone(),
        settings.player.duration_seconds,
    );
    if let Some(saved_seconds) = settings.player.resume_from_seconds {
        let saved = ProgressCheckpoint {
            content_id: settings.player.content_id.clone(),
            progress_seconds: saved_seconds,
            completed: false,
            recorded_at: Utc::now(),
        };
        if let Some(position) = tracker.resume_from(&saved) {
            player.seek(position)?;
            info!(position, "Resuming from saved progress");
        }
    }

    let scheduler = TriggerScheduler::new(
        settings.triggers.clone(),
        settings.player.tolerance_seconds,
        playback.clone(),
    )?;
    let session = PlaybackSession::new(scheduler, player.subscribe_time());
    let handle = session.handle();

    let overlay_task = tokio::spawn(run_overlay(
        handle.subscribe(),
        playback.clone(),
        settings.player.overlay_hold(),
    ));
    let progress_task =
        tokio::spawn(tracker.track(player.subscribe_time(), Arc::new(LogProgressSink)));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let player_for_shutdown = player.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal, initiating graceful shutdown");
                let _ = shutdown_tx.send(());
                player_for_shutdown.dispose();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    playback.resume()?;
    let summary = session.run(shutdown_rx).await;

    // Session teardown releases the player and the overlay
    player.dispose();
    drop(handle);
    overlay_task.abort();

    match progress_task.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(error = %e, "Progress tracking failed"),
        Err(e) => warn!(error = %e, "Progress task panicked"),
    }

    info!(
        summary = %serde_json::to_string(&summary)?,
        "Playback session finished"
    );

    if settings.observability.tracing_endpoint.is_some() {
        telemetry::shutdown_tracer();
    }

    Ok(())
}

/// Stand-in for the trivia/ad overlay: hold playback, then resume it
async fn run_overlay(
    mut events: broadcast::Receiver<TriggerFired>,
    playback: Arc<dyn PlaybackControl>,
    hold: Duration,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                info!(
                    category = %event.point.category,
                    payload_id = %event.point.payload_id,
                    hold_seconds = hold.as_secs(),
                    "Showing overlay"
                );
                tokio::time::sleep(hold).await;
                if playback.is_disposed() {
                    break;
                }
                if let Err(e) = playback.resume() {
                    warn!(error = %e, "Could not resume playback after overlay");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Overlay fell behind trigger events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
