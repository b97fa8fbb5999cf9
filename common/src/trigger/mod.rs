// Trigger module for pause-for-overlay detection during playback

pub mod engine;
pub mod session;

pub use engine::{TriggerScheduler, DEFAULT_TOLERANCE_SECONDS};
pub use session::{PlaybackSession, SessionCommand, SessionHandle, SessionSummary};
