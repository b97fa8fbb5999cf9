// Async driver that feeds a trigger scheduler from a player's time channel

use crate::errors::SessionError;
use crate::models::TriggerFired;
use crate::trigger::engine::TriggerScheduler;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const COMMAND_CHANNEL_CAPACITY: usize = 8;

/// Commands an overlay can send to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Re-arm all trigger points (replay from the start)
    Reset,
}

/// Outcome of a finished playback session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub fired: usize,
    pub pending: usize,
    /// Unfired points whose window playback moved past, usually by seeking
    pub skipped: usize,
    pub last_time_seconds: f64,
}

/// Cloneable handle for the overlay side of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    command_tx: mpsc::Sender<SessionCommand>,
    events_tx: broadcast::Sender<TriggerFired>,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Subscribe to `TriggerFired` events
    pub fn subscribe(&self) -> broadcast::Receiver<TriggerFired> {
        self.events_tx.subscribe()
    }

    /// Ask the session to re-arm its trigger points
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.command_tx
            .send(SessionCommand::Reset)
            .await
            .map_err(|_| SessionError::Closed(self.session_id))
    }
}

/// One playback session: a scheduler bound to a time-advance subscription
///
/// The scheduler is moved into `run`, so every `on_time_advanced` and
/// `reset` call happens on the single task that runs the session.
pub struct PlaybackSession {
    scheduler: TriggerScheduler,
    time_rx: watch::Receiver<f64>,
    command_tx: mpsc::Sender<SessionCommand>,
    command_rx: mpsc::Receiver<SessionCommand>,
}

impl PlaybackSession {
    pub fn new(scheduler: TriggerScheduler, time_rx: watch::Receiver<f64>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        Self {
            scheduler,
            time_rx,
            command_tx,
            command_rx,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session_id: self.scheduler.session_id(),
            command_tx: self.command_tx.clone(),
            events_tx: self.scheduler.event_sender(),
        }
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    /// Drive the scheduler until the time channel closes or shutdown fires
    ///
    /// The position current at start is evaluated first, then every
    /// subsequent time-advance notification. Shutdown and queued commands
    /// are handled before the next time sample. Dropping the shutdown
    /// sender counts as a shutdown signal.
    ///
    /// The time channel is a `watch`, so it keeps only the latest position.
    /// If this task falls behind the player, intermediate samples are
    /// coalesced and only the newest one is evaluated; a window passed over
    /// entirely in that gap behaves like a seek past it.
    #[instrument(skip_all, fields(session_id = %self.scheduler.session_id()))]
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> SessionSummary {
        info!("Playback session started");

        let mut last_time = *self.time_rx.borrow_and_update();
        self.scheduler.on_time_advanced(last_time);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping session");
                    break;
                }
                Some(command) = self.command_rx.recv() => {
                    debug!(?command, "Session command received");
                    match command {
                        SessionCommand::Reset => self.scheduler.reset(),
                    }
                }
                changed = self.time_rx.changed() => {
                    if changed.is_err() {
                        info!("Time-advance channel closed, ending session");
                        break;
                    }
                    last_time = *self.time_rx.borrow_and_update();
                    self.scheduler.on_time_advanced(last_time);
                }
            }
        }

        let skipped = self.scheduler.passed_unfired(last_time);
        for point in &skipped {
            warn!(
                payload_id = %point.payload_id,
                category = %point.category,
                time_offset_seconds = point.time_offset_seconds,
                "Trigger window was skipped and never fired"
            );
        }

        let summary = SessionSummary {
            session_id: self.scheduler.session_id(),
            fired: self.scheduler.fired_count(),
            pending: self.scheduler.pending_count(),
            skipped: skipped.len(),
            last_time_seconds: last_time,
        };

        info!(
            fired = summary.fired,
            pending = summary.pending,
            skipped = summary.skipped,
            last_time = summary.last_time_seconds,
            "Playback session ended"
        );

        summary
    }
}
