// Playback progress tracking for "continue watching" and post-video trivia

use crate::config::ProgressConfig;
use crate::errors::SessionError;
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// A playback position worth persisting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressCheckpoint {
    pub content_id: String,
    pub progress_seconds: u64,
    pub completed: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Destination for progress checkpoints
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn save(&self, checkpoint: &ProgressCheckpoint) -> Result<(), SessionError>;

    /// Called once when playback crosses the completion threshold
    async fn trivia_ready(&self, _content_id: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Sink that only logs checkpoints
pub struct LogProgressSink;

#[async_trait]
impl ProgressSink for LogProgressSink {
    async fn save(&self, checkpoint: &ProgressCheckpoint) -> Result<(), SessionError> {
        info!(
            content_id = %checkpoint.content_id,
            progress_seconds = checkpoint.progress_seconds,
            completed = checkpoint.completed,
            "Progress checkpoint"
        );
        Ok(())
    }

    async fn trivia_ready(&self, content_id: &str) -> Result<(), SessionError> {
        info!(content_id = %content_id, "Trivia challenge ready");
        Ok(())
    }
}

/// Decides when the playback position should be saved
///
/// A checkpoint is produced whenever the whole-second position moves at
/// least `save_threshold_seconds` away from the last saved one, in either
/// direction.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    content_id: String,
    config: ProgressConfig,
    duration_seconds: f64,
    last_saved_seconds: u64,
    last_position: f64,
    completed_saved: bool,
    trivia_ready: bool,
    trivia_announced: bool,
}

impl ProgressTracker {
    pub fn new(content_id: impl Into<String>, config: ProgressConfig, duration_seconds: f64) -> Self {
        Self {
            content_id: content_id.into(),
            config,
            duration_seconds,
            last_saved_seconds: 0,
            last_position: 0.0,
            completed_saved: false,
            trivia_ready: false,
            trivia_announced: false,
        }
    }

    /// Seed the tracker from a saved checkpoint
    ///
    /// Returns the position to seek to, or `None` when the saved
    /// checkpoint is empty or already completed (start from the top).
    pub fn resume_from(&mut self, saved: &ProgressCheckpoint) -> Option<f64> {
        if saved.progress_seconds == 0 || saved.completed {
            return None;
        }
        self.last_saved_seconds = saved.progress_seconds;
        self.last_position = saved.progress_seconds as f64;
        Some(saved.progress_seconds as f64)
    }

    fn percent(&self, position: f64) -> f64 {
        if self.duration_seconds > 0.0 {
            position / self.duration_seconds * 100.0
        } else {
            0.0
        }
    }

    fn checkpoint(&self, progress_seconds: u64, completed: bool) -> ProgressCheckpoint {
        ProgressCheckpoint {
            content_id: self.content_id.clone(),
            progress_seconds,
            completed,
            recorded_at: Utc::now(),
        }
    }

    /// Handle a time-advance notification
    pub fn on_time_advanced(&mut self, current_time_seconds: f64) -> Option<ProgressCheckpoint> {
        if !current_time_seconds.is_finite()
            || current_time_seconds <= 0.0
            || self.duration_seconds <= 0.0
        {
            return None;
        }
        self.last_position = current_time_seconds;

        let completed = self.percent(current_time_seconds) >= self.config.completion_percent;
        if completed {
            self.trivia_ready = true;
        }

        let progress_seconds = current_time_seconds.floor() as u64;
        if progress_seconds.abs_diff(self.last_saved_seconds) < self.config.save_threshold_seconds
        {
            return None;
        }

        self.last_saved_seconds = progress_seconds;
        self.completed_saved |= completed;
        Some(self.checkpoint(progress_seconds, completed))
    }

    /// Final checkpoint when playback reaches the end of the media
    ///
    /// Returns `None` if a completed checkpoint at the end was already saved.
    pub fn on_ended(&mut self) -> Option<ProgressCheckpoint> {
        let progress_seconds = self.duration_seconds.max(0.0).floor() as u64;
        self.trivia_ready = true;
        if self.completed_saved && self.last_saved_seconds == progress_seconds {
            return None;
        }
        self.last_saved_seconds = progress_seconds;
        self.completed_saved = true;
        Some(self.checkpoint(progress_seconds, true))
    }

    /// True exactly once, the first time the completion threshold is reached
    pub fn take_trivia_ready(&mut self) -> bool {
        if self.trivia_ready && !self.trivia_announced {
            self.trivia_announced = true;
            return true;
        }
        false
    }

    pub fn last_saved_seconds(&self) -> u64 {
        self.last_saved_seconds
    }

    /// Consume time-advance notifications until the channel closes
    ///
    /// If the last position seen is the end of the media, a final completed
    /// checkpoint is saved.
    #[instrument(skip_all, fields(content_id = %self.content_id))]
    pub async fn track(
        mut self,
        mut time_rx: watch::Receiver<f64>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<ProgressTracker, SessionError> {
        while time_rx.changed().await.is_ok() {
            let position = *time_rx.borrow_and_update();
            if let Some(checkpoint) = self.on_time_advanced(position) {
                sink.save(&checkpoint).await?;
                telemetry::record_progress_checkpoint(checkpoint.completed);
            }
            if self.take_trivia_ready() {
                sink.trivia_ready(&self.content_id).await?;
            }
        }

        if self.duration_seconds > 0.0 && self.last_position >= self.duration_seconds {
            if let Some(checkpoint) = self.on_ended() {
                sink.save(&checkpoint).await?;
                telemetry::record_progress_checkpoint(true);
            }
            if self.take_trivia_ready() {
                sink.trivia_ready(&self.content_id).await?;
            }
        }

        debug!(last_saved_seconds = self.last_saved_seconds, "Progress tracking stopped");
        Ok(self)
    }
}
