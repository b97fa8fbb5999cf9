// Common library for the trigger scheduler, playback seam, and progress tracking

pub mod config;
pub mod errors;
pub mod models;
pub mod playback;
pub mod progress;
pub mod telemetry;
pub mod trigger;
