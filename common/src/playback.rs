// Playback collaborator seam and a simulated player for driving sessions

use crate::errors::PlaybackError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

/// Operations the trigger scheduler and overlay need from a playback engine
///
/// `pause` is fire-and-forget from the scheduler's point of view: the engine
/// must stop emitting time-advance notifications once the pause takes effect.
#[cfg_attr(test, mockall::automock)]
pub trait PlaybackControl: Send + Sync {
    /// Current playback position in seconds
    fn current_time(&self) -> f64;

    fn pause(&self) -> Result<(), PlaybackError>;

    fn resume(&self) -> Result<(), PlaybackError>;

    fn is_disposed(&self) -> bool;
}

/// Configuration for the simulated player
#[derive(Debug, Clone)]
pub struct SimulatedPlayerConfig {
    /// Interval between time-advance notifications
    pub tick_interval: Duration,
    /// Total media length in seconds
    pub duration_seconds: f64,
    /// Media seconds advanced per wall-clock second
    pub playback_rate: f64,
}

impl Default for SimulatedPlayerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            duration_seconds: 400.0,
            playback_rate: 1.0,
        }
    }
}

#[derive(Debug)]
struct PlayerState {
    position: f64,
    playing: bool,
    ended: bool,
    disposed: bool,
    time_tx: Option<watch::Sender<f64>>,
}

impl PlayerState {
    fn publish(&self) {
        if let Some(tx) = &self.time_tx {
            tx.send_replace(self.position);
        }
    }

    /// Drop the sender so every subscriber sees the channel close
    fn close(&mut self) {
        self.playing = false;
        self.time_tx = None;
    }
}

/// A clock-driven stand-in for a video engine
///
/// While playing, a background task advances the position every tick and
/// publishes it on a watch channel. Pausing stops the notifications; reaching
/// the end or disposing closes the channel.
#[derive(Debug)]
pub struct SimulatedPlayer {
    config: SimulatedPlayerConfig,
    state: Arc<Mutex<PlayerState>>,
    time_rx: watch::Receiver<f64>,
}

impl SimulatedPlayer {
    /// Create a paused player at position 0 and start its clock task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: SimulatedPlayerConfig) -> Arc<Self> {
        let (time_tx, time_rx) = watch::channel(0.0);
        let state = Arc::new(Mutex::new(PlayerState {
            position: 0.0,
            playing: false,
            ended: false,
            disposed: false,
            time_tx: Some(time_tx),
        }));

        let player = Arc::new(Self {
            config,
            state,
            time_rx,
        });

        tokio::spawn(Self::run_clock(player.config.clone(), player.state.clone()));

        player
    }

    async fn run_clock(config: SimulatedPlayerConfig, shared: Arc<Mutex<PlayerState>>) {
        let step = config.tick_interval.as_secs_f64() * config.playback_rate;
        let mut ticker = interval(config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let mut state = lock(&shared);
            if state.disposed || state.ended {
                break;
            }
            if !state.playing {
                continue;
            }

            state.position = (state.position + step).min(config.duration_seconds);
            state.publish();

            if state.position >= config.duration_seconds {
                state.ended = true;
                state.close();
                info!(
                    duration_seconds = config.duration_seconds,
                    "Playback reached the end of the media"
                );
                break;
            }
        }

        debug!("Player clock stopped");
    }

    /// Subscribe to time-advance notifications
    pub fn subscribe_time(&self) -> watch::Receiver<f64> {
        self.time_rx.clone()
    }

    /// Jump to `position_seconds`, clamped to the media, and notify subscribers
    #[instrument(skip(self))]
    pub fn seek(&self, position_seconds: f64) -> Result<(), PlaybackError> {
        let mut state = lock(&self.state);
        if state.disposed {
            return Err(PlaybackError::Disposed);
        }
        if state.ended {
            return Err(PlaybackError::Rejected("playback has ended".to_string()));
        }
        if !position_seconds.is_finite() {
            return Err(PlaybackError::Rejected(format!(
                "cannot seek to {}",
                position_seconds
            )));
        }

        state.position = position_seconds.clamp(0.0, self.config.duration_seconds);
        state.publish();
        debug!(position = state.position, "Seeked");
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    pub fn is_ended(&self) -> bool {
        lock(&self.state).ended
    }

    pub fn duration_seconds(&self) -> f64 {
        self.config.duration_seconds
    }

    /// Release the player; the time channel closes and the clock task exits
    pub fn dispose(&self) {
        let mut state = lock(&self.state);
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.close();
        info!(position = state.position, "Player disposed");
    }
}

impl PlaybackControl for SimulatedPlayer {
    fn current_time(&self) -> f64 {
        lock(&self.state).position
    }

    fn pause(&self) -> Result<(), PlaybackError> {
        let mut state = lock(&self.state);
        if state.disposed {
            return Err(PlaybackError::Disposed);
        }
        state.playing = false;
        debug!(position = state.position, "Playback paused");
        Ok(())
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        let mut state = lock(&self.state);
        if state.disposed {
            return Err(PlaybackError::Disposed);
        }
        if state.ended {
            return Err(PlaybackError::Rejected("playback has ended".to_string()));
        }
        state.playing = true;
        debug!(position = state.position, "Playback resumed");
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        lock(&self.state).disposed
    }
}

// The state is only touched for short, non-panicking sections
fn lock(state: &Mutex<PlayerState>) -> MutexGuard<'_, PlayerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
