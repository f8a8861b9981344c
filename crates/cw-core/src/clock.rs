//! Wall clock seam
//!
//! The canvas service reports cooldowns as absolute epoch milliseconds, so
//! the scheduler needs wall time, not a monotonic instant. Tests inject a
//! fixed clock.

use chrono::{DateTime, Local, Utc};
use std::time::Duration;

/// Source of the current wall time
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Delay from `now_ms` until `at_ms`, zero if already past
#[inline]
#[must_use]
pub fn until(at_ms: i64, now_ms: i64) -> Duration {
    u64::try_from(at_ms.saturating_sub(now_ms))
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO)
}

/// Render epoch milliseconds as local `HH:MM:SS` for log lines
#[must_use]
pub fn local_time(at_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(at_ms)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| at_ms.to_string())
}
