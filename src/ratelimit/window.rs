//! Time windows and per-window limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Sliding time window a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Window {
    /// Trailing second
    #[serde(rename = "per_second")]
    Second,
    /// Trailing minute
    #[serde(rename = "per_minute")]
    Minute,
    /// Trailing hour
    #[serde(rename = "per_hour")]
    Hour,
    /// Trailing day
    #[serde(rename = "per_day")]
    Day,
}

impl Window {
    /// All windows in evaluation order. The first full window wins.
    pub const ALL: [Window; 4] = [Window::Second, Window::Minute, Window::Hour, Window::Day];

    /// Length of the window in seconds.
    pub fn seconds(&self) -> u64 {
        match self {
            Window::Second => 1,
            Window::Minute => 60,
            Window::Hour => 3600,
            Window::Day => 86400,
        }
    }

    /// Length of the window as a `Duration`.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    /// Canonical name, used in storage keys and rejection reports.
    pub fn name(&self) -> &'static str {
        match self {
            Window::Second => "per_second",
            Window::Minute => "per_minute",
            Window::Hour => "per_hour",
            Window::Day => "per_day",
        }
    }

    /// Parse a canonical window name.
    pub fn from_name(name: &str) -> Option<Self> {
        Window::ALL.into_iter().find(|w| w.name() == name)
    }

    /// Position in [`Window::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Window::Second => 0,
            Window::Minute => 1,
            Window::Hour => 2,
            Window::Day => 3,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Largest limit the store script can represent exactly (2^53). Larger
/// limits are treated as this value.
pub const MAX_LIMIT: u64 = 1 << 53;

/// Limits for one check, one per window.
///
/// A limit of `0` leaves that window unconstrained; it never means "deny
/// everything". Fields missing from a serialized config default to `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default)]
    pub per_second: u64,
    #[serde(default)]
    pub per_minute: u64,
    #[serde(default)]
    pub per_hour: u64,
    #[serde(default)]
    pub per_day: u64,
}

impl WindowConfig {
    /// A config with every window unconstrained.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn per_second(mut self, limit: u64) -> Self {
        self.per_second = limit;
        self
    }

    pub fn per_minute(mut self, limit: u64) -> Self {
        self.per_minute = limit;
        self
    }

    pub fn per_hour(mut self, limit: u64) -> Self {
        self.per_hour = limit;
        self
    }

    pub fn per_day(mut self, limit: u64) -> Self {
        self.per_day = limit;
        self
    }

    /// The effective limit for a window (`0` when unconstrained), capped
    /// at [`MAX_LIMIT`].
    pub fn limit(&self, window: Window) -> u64 {
        let limit = match window {
            Window::Second => self.per_second,
            Window::Minute => self.per_minute,
            Window::Hour => self.per_hour,
            Window::Day => self.per_day,
        };
        limit.min(MAX_LIMIT)
    }

    /// Limits in evaluation order.
    pub fn limits(&self) -> [u64; 4] {
        Window::ALL.map(|w| self.limit(w))
    }

    /// Constrained windows with their limits, in evaluation order.
    pub fn constrained(&self) -> impl Iterator<Item = (Window, u64)> + '_ {
        Window::ALL
            .into_iter()
            .map(move |w| (w, self.limit(w)))
            .filter(|(_, limit)| *limit > 0)
    }

    /// True when no window has a limit.
    pub fn is_unconstrained(&self) -> bool {
        self.limits().iter().all(|l| *l == 0)
    }
}
