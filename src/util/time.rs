//! Time utilities for the client frame loop

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Frame cadence of the movement loop
pub const FRAME_TPS: u32 = 60; // 60 frames per second
pub const FRAME_DURATION_MICROS: u64 = 1_000_000 / FRAME_TPS as u64;

/// Interval between movement frames
pub fn frame_interval() -> Duration {
    Duration::from_micros(FRAME_DURATION_MICROS)
}

/// Elapsed seconds between two instants, zero if `later` is not after `earlier`
pub fn elapsed_secs(earlier: tokio::time::Instant, later: tokio::time::Instant) -> f32 {
    later.saturating_duration_since(earlier).as_secs_f32()
}
