//! Store abstraction for the atomic check-and-record step.

use async_trait::async_trait;
use serde::Serialize;

use super::window::{Window, WindowConfig};
use crate::error::Result;

/// One check-and-record request handed to a backend.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The rate limit key
    pub key: String,
    /// Caller-supplied current time, unix seconds
    pub now: i64,
    /// Limits for this call; `0` leaves a window unconstrained
    pub limits: WindowConfig,
    /// Unique member recorded in each window on acceptance
    pub marker: String,
}

/// The window that denied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub window: Window,
    /// Markers in the window at decision time
    pub count: u64,
    pub limit: u64,
}

/// Decision reached by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Violation),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Live marker counts for one key, indexed like [`Window::ALL`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    pub per_second: u64,
    pub per_minute: u64,
    pub per_hour: u64,
    pub per_day: u64,
}

impl WindowUsage {
    pub fn from_counts(counts: [u64; 4]) -> Self {
        let [per_second, per_minute, per_hour, per_day] = counts;
        Self {
            per_second,
            per_minute,
            per_hour,
            per_day,
        }
    }

    pub fn get(&self, window: Window) -> u64 {
        match window {
            Window::Second => self.per_second,
            Window::Minute => self.per_minute,
            Window::Hour => self.per_hour,
            Window::Day => self.per_day,
        }
    }
}

/// Trait for window state stores.
///
/// `execute` must behave as one indivisible step with respect to every
/// other `execute` on the same key:
///
/// - for each window with a non-zero limit, in [`Window::ALL`] order, purge
///   markers with a score at or below `now - window_seconds`, then count;
/// - stop at the first window whose count has reached its limit and reject,
///   recording nothing anywhere;
/// - otherwise record `marker` at score `now` in every constrained window
///   and reset that window's expiry to `window_seconds + 1`.
#[async_trait]
pub trait WindowBackend: Send + Sync {
    /// Run the atomic check-and-record sequence.
    async fn execute(&self, eval: &Evaluation) -> Result<Verdict>;

    /// Count live markers per window at `now` without modifying anything.
    async fn usage(&self, key: &str, now: i64) -> Result<WindowUsage>;

    /// Drop all window state for a key.
    async fn reset(&self, key: &str) -> Result<()>;
}

/// Lowest score still inside `window` at `now`.
pub(crate) fn window_floor(now: i64, window: Window) -> i64 {
    now - window.seconds() as i64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_floor() {
        assert_eq!(window_floor(1000, Window::Second), 1000);
        assert_eq!(window_floor(1000, Window::Minute), 941);
        assert_eq!(window_floor(100_000, Window::Day), 13_601);
    }

    #[test]
    fn test_usage_from_counts() {
        let usage = WindowUsage::from_counts([1, 2, 3, 4]);
        for (i, window) in Window::ALL.iter().enumerate() {
            assert_eq!(usage.get(*window), i as u64 + 1);
        }
    }
}
