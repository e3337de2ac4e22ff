//! Storage key layout and marker generation.

use uuid::Uuid;

use super::window::Window;

/// Default namespace for all limiter keys in the store.
pub const DEFAULT_KEY_PREFIX: &str = "rate_limit";

/// The four store keys holding one rate limit key's window state.
///
/// Keys have the form `{prefix}:{{{key}}}:{window}`. The braces are a Redis
/// Cluster hash tag, so every window of a key lands in the same slot and a
/// single script may touch all of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKeys {
    keys: [String; 4],
}

impl StorageKeys {
    /// Build the window keys for a rate limit key.
    pub fn new(prefix: &str, key: &str) -> Self {
        Self {
            keys: Window::ALL.map(|w| format!("{}:{{{}}}:{}", prefix, key, w.name())),
        }
    }

    /// The store key for one window.
    pub fn get(&self, window: Window) -> &str {
        &self.keys[window.index()]
    }

    /// All four keys in evaluation order.
    pub fn all(&self) -> &[String; 4] {
        &self.keys
    }
}

/// Generate a unique marker for an event recorded at `now`.
///
/// Markers live in a sorted set, so two requests in the same second need
/// distinct members or the second would overwrite the first.
pub fn new_marker(now: i64) -> String {
    format!("{}:{}", now, Uuid::new_v4().simple())
}
