// Trigger-point scheduler: fires one-shot overlay events as playback enters
// each point's tolerance window

use crate::errors::TriggerError;
use crate::models::{TriggerFired, TriggerPoint};
use crate::playback::PlaybackControl;
use crate::telemetry;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Half-width of the match window when none is configured
///
/// Time-advance notifications arriving more often than every `2 * 0.5`
/// seconds cannot step over a window.
pub const DEFAULT_TOLERANCE_SECONDS: f64 = 0.5;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Watches playback time and fires each trigger point at most once per session
///
/// The trigger list is owned here; callers only get read access to it.
/// All mutation goes through `on_time_advanced` and `reset`, which take
/// `&mut self`, so a scheduler is driven from exactly one place.
pub struct TriggerScheduler {
    session_id: Uuid,
    points: Vec<TriggerPoint>,
    /// Indices into `points`, ascending by time offset then input position
    order: Vec<usize>,
    tolerance: f64,
    playback: Arc<dyn PlaybackControl>,
    events_tx: broadcast::Sender<TriggerFired>,
}

impl TriggerScheduler {
    /// Build a scheduler for one playback session
    ///
    /// Fails if `tolerance` is not a finite positive number or any point is
    /// invalid. Every point starts unfired regardless of its input state.
    pub fn new(
        points: Vec<TriggerPoint>,
        tolerance: f64,
        playback: Arc<dyn PlaybackControl>,
    ) -> Result<Self, TriggerError> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(TriggerError::InvalidTolerance(tolerance));
        }

        let mut points = points;
        for (index, point) in points.iter_mut().enumerate() {
            point.validate(index)?;
            point.validate_window(index, tolerance)?;
            // -0.0 sorts before 0.0 under total_cmp
            point.time_offset_seconds += 0.0;
            point.set_fired(false);
        }

        // Stable sort keeps input order for equal offsets
        let mut order: Vec<usize> = (0..points.len()).collect();
        order.sort_by(|&a, &b| {
            points[a]
                .time_offset_seconds
                .total_cmp(&points[b].time_offset_seconds)
        });

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session_id = Uuid::new_v4();

        info!(
            session_id = %session_id,
            trigger_count = points.len(),
            tolerance_seconds = tolerance,
            "Trigger scheduler created"
        );

        Ok(Self {
            session_id,
            points,
            order,
            tolerance,
            playback,
            events_tx,
        })
    }

    pub fn with_default_tolerance(
        points: Vec<TriggerPoint>,
        playback: Arc<dyn PlaybackControl>,
    ) -> Result<Self, TriggerError> {
        Self::new(points, DEFAULT_TOLERANCE_SECONDS, playback)
    }

    /// Handle a time-advance notification
    ///
    /// Fires at most one point per call: the first unfired point, in
    /// tie-break order, whose window contains `current_time_seconds`.
    /// Firing marks the point, asks the player to pause, then broadcasts
    /// the event to subscribers. A failed pause is logged and otherwise
    /// ignored.
    pub fn on_time_advanced(&mut self, current_time_seconds: f64) -> Option<TriggerFired> {
        let tolerance = self.tolerance;
        let index = self.order.iter().copied().find(|&i| {
            let point = &self.points[i];
            !point.fired() && point.window_contains(current_time_seconds, tolerance)
        })?;

        self.points[index].set_fired(true);
        let point = self.points[index].clone();

        if let Err(e) = self.playback.pause() {
            warn!(
                session_id = %self.session_id,
                payload_id = %point.payload_id,
                error = %e,
                "Player could not pause for trigger, continuing"
            );
            telemetry::record_pause_failure(point.category);
        }

        let event = TriggerFired {
            session_id: self.session_id,
            index,
            point,
            current_time_seconds,
            fired_at: Utc::now(),
        };

        info!(
            session_id = %self.session_id,
            category = %event.point.category,
            payload_id = %event.point.payload_id,
            time_offset_seconds = event.point.time_offset_seconds,
            current_time = current_time_seconds,
            "Trigger fired"
        );
        telemetry::record_trigger_fired(
            event.point.category,
            current_time_seconds - event.point.time_offset_seconds,
        );

        if self.events_tx.send(event.clone()).is_err() {
            debug!(
                payload_id = %event.point.payload_id,
                "No overlay subscribed to trigger events"
            );
        }

        Some(event)
    }

    /// Re-arm every point for a replay of the same session
    pub fn reset(&mut self) {
        for point in &mut self.points {
            point.set_fired(false);
        }
        info!(session_id = %self.session_id, "Trigger points re-armed");
        telemetry::record_trigger_reset();
    }

    /// Register an overlay listener for `TriggerFired` events
    pub fn subscribe(&self) -> broadcast::Receiver<TriggerFired> {
        self.events_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<TriggerFired> {
        self.events_tx.clone()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Trigger points in input order, with their current `fired` state
    pub fn points(&self) -> &[TriggerPoint] {
        &self.points
    }

    pub fn fired_count(&self) -> usize {
        self.points.iter().filter(|p| p.fired()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.points.len() - self.fired_count()
    }

    pub fn is_exhausted(&self) -> bool {
        self.points.iter().all(TriggerPoint::fired)
    }

    /// Unfired points whose window lies entirely before `current_time_seconds`
    ///
    /// These were jumped over by a seek and will not fire this session
    /// unless the scheduler is reset.
    pub fn passed_unfired(&self, current_time_seconds: f64) -> Vec<&TriggerPoint> {
        self.order
            .iter()
            .map(|&i| &self.points[i])
            .filter(|p| {
                !p.fired() && p.time_offset_seconds + self.tolerance <= current_time_seconds
            })
            .collect()
    }
}
