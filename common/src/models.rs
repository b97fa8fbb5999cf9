use crate::errors::TriggerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Trigger Models
// ============================================================================

/// TriggerCategory defines what kind of interruption a trigger point causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerCategory {
    Ad,
    Trivia,
}

impl TriggerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCategory::Ad => "ad",
            TriggerCategory::Trivia => "trivia",
        }
    }
}

impl fmt::Display for TriggerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TriggerPoint is a scheduled in-playback interruption
///
/// The `fired` flag is owned by the scheduler; it is never read from or
/// written to the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerPoint {
    #[serde(rename = "time", alias = "timeOffsetSeconds")]
    pub time_offset_seconds: f64,
    #[serde(rename = "type", alias = "category")]
    pub category: TriggerCategory,
    #[serde(rename = "data_id", alias = "payloadId")]
    pub payload_id: String,
    #[serde(skip)]
    fired: bool,
}

impl TriggerPoint {
    pub fn new(
        time_offset_seconds: f64,
        category: TriggerCategory,
        payload_id: impl Into<String>,
    ) -> Self {
        Self {
            time_offset_seconds,
            category,
            payload_id: payload_id.into(),
            fired: false,
        }
    }

    pub fn ad(time_offset_seconds: f64, payload_id: impl Into<String>) -> Self {
        Self::new(time_offset_seconds, TriggerCategory::Ad, payload_id)
    }

    pub fn trivia(time_offset_seconds: f64, payload_id: impl Into<String>) -> Self {
        Self::new(time_offset_seconds, TriggerCategory::Trivia, payload_id)
    }

    /// Whether this point has already fired in the current session
    pub fn fired(&self) -> bool {
        self.fired
    }

    pub(crate) fn set_fired(&mut self, fired: bool) {
        self.fired = fired;
    }

    /// Whether `current_time_seconds` falls in `[time - tolerance, time + tolerance)`
    pub fn window_contains(&self, current_time_seconds: f64, tolerance: f64) -> bool {
        current_time_seconds >= self.time_offset_seconds - tolerance
            && current_time_seconds < self.time_offset_seconds + tolerance
    }

    /// Validate a single point; `index` is its position in the input list
    pub fn validate(&self, index: usize) -> Result<(), TriggerError> {
        if !self.time_offset_seconds.is_finite() {
            return Err(TriggerError::InvalidTriggerPoint {
                index,
                reason: format!("time offset {} is not finite", self.time_offset_seconds),
            });
        }
        if self.time_offset_seconds < 0.0 {
            return Err(TriggerError::InvalidTriggerPoint {
                index,
                reason: format!("time offset {} is negative", self.time_offset_seconds),
            });
        }
        if self.payload_id.trim().is_empty() {
            return Err(TriggerError::InvalidTriggerPoint {
                index,
                reason: "payload_id cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Check that the window at `tolerance` still contains the offset itself
    ///
    /// For very large offsets `offset ± tolerance` rounds back to `offset`
    /// and the window becomes empty.
    pub fn validate_window(&self, index: usize, tolerance: f64) -> Result<(), TriggerError> {
        if !self.window_contains(self.time_offset_seconds, tolerance) {
            return Err(TriggerError::InvalidTriggerPoint {
                index,
                reason: format!(
                    "time offset {} is too large for a {}s window",
                    self.time_offset_seconds, tolerance
                ),
            });
        }
        Ok(())
    }

    /// Parse a JSON array of trigger records
    ///
    /// Accepts both the player's native shape (`time`, `type`, `data_id`)
    /// and camelCase (`timeOffsetSeconds`, `category`, `payloadId`).
    /// Every point comes back unfired and validated.
    pub fn list_from_json(json: &str) -> Result<Vec<TriggerPoint>, TriggerError> {
        let points: Vec<TriggerPoint> = serde_json::from_str(json)?;
        for (index, point) in points.iter().enumerate() {
            point.validate(index)?;
        }
        Ok(points)
    }

    /// The trigger list the web player ships with when no per-title list exists
    pub fn default_points() -> Vec<TriggerPoint> {
        vec![
            TriggerPoint::ad(30.0, "AD_001"),
            TriggerPoint::trivia(125.0, "Q_987"),
            TriggerPoint::ad(350.0, "AD_002"),
        ]
    }
}

/// TriggerFired is emitted once per point when playback enters its window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerFired {
    pub session_id: Uuid,
    /// Position of the point in the list the scheduler was built from
    pub index: usize,
    pub point: TriggerPoint,
    /// Playback position that matched the window
    pub current_time_seconds: f64,
    pub fired_at: DateTime<Utc>,
}
