//! In-process window store.
//!
//! Holds the same per-window marker sets the Redis backend keeps, guarded
//! by the `DashMap` shard lock of the rate limit key. That lock is what
//! makes a check-and-record indivisible here, so this backend is only
//! correct when every caller shares the same process.
//!
//! Keys whose windows have all expired are swept from `execute` at most
//! once per [`SWEEP_INTERVAL_SECS`].

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::{window_floor, Evaluation, Verdict, Violation, WindowBackend, WindowUsage};
use super::window::Window;
use crate::error::Result;

/// Minimum clock distance between two idle-key sweeps.
pub const SWEEP_INTERVAL_SECS: i64 = 60;

/// Marker sets for all windows of one key.
#[derive(Debug, Default)]
struct KeyState {
    /// (score, marker) per window, ordered by score
    windows: [BTreeSet<(i64, String)>; 4],
    /// Expiry per window in unix seconds, `0` when never written
    expires_at: [i64; 4],
}

impl KeyState {
    /// Drop markers that have slid out of `window` at `now`.
    fn purge(&mut self, window: Window, now: i64) {
        let i = window.index();
        if self.expires_at[i] != 0 && now >= self.expires_at[i] {
            self.windows[i].clear();
            self.expires_at[i] = 0;
            return;
        }
        let live = self.windows[i].split_off(&(window_floor(now, window), String::new()));
        self.windows[i] = live;
    }

    fn live_count(&self, window: Window, now: i64) -> u64 {
        let i = window.index();
        if self.expires_at[i] != 0 && now >= self.expires_at[i] {
            return 0;
        }
        self.windows[i]
            .range((window_floor(now, window), String::new())..)
            .count() as u64
    }

    fn is_empty(&self) -> bool {
        self.windows.iter().all(BTreeSet::is_empty)
    }
}

/// A [`WindowBackend`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    keys: DashMap<String, KeyState>,
    /// Clock reading of the last sweep, `0` before the first
    last_sweep: AtomicI64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently holding any state.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Drop keys with no live markers at `now`. Returns how many were removed.
    pub fn evict_idle(&self, now: i64) -> usize {
        let before = self.keys.len();
        self.keys.retain(|_, state| {
            for window in Window::ALL {
                state.purge(window, now);
            }
            !state.is_empty()
        });
        before.saturating_sub(self.keys.len())
    }

    /// Run [`evict_idle`](Self::evict_idle) if the last sweep is at least
    /// [`SWEEP_INTERVAL_SECS`] behind `now`. Concurrent callers race for the
    /// sweep and only the winner runs it.
    fn sweep_if_due(&self, now: i64) {
        let last = self.last_sweep.load(Ordering::Acquire);
        if now - last < SWEEP_INTERVAL_SECS {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let evicted = self.evict_idle(now);
        if evicted > 0 {
            debug!(evicted, remaining = self.keys.len(), "Evicted idle keys");
        }
    }

    /// Drop all state.
    pub fn clear(&self) {
        self.keys.clear();
    }

    fn execute_locked(&self, eval: &Evaluation) -> Verdict {
        let limits = eval.limits.limits();
        if limits.iter().all(|l| *l == 0) {
            return Verdict::Accepted;
        }

        let mut state = self.keys.entry(eval.key.clone()).or_default();

        for window in Window::ALL {
            let limit = limits[window.index()];
            if limit == 0 {
                continue;
            }

            state.purge(window, eval.now);
            let count = state.windows[window.index()].len() as u64;
            if count >= limit {
                return Verdict::Rejected(Violation {
                    window,
                    count,
                    limit,
                });
            }
        }

        for (window, _) in eval.limits.constrained() {
            let i = window.index();
            state.windows[i].insert((eval.now, eval.marker.clone()));
            state.expires_at[i] = eval.now + window.seconds() as i64 + 1;
        }

        Verdict::Accepted
    }
}

#[async_trait]
impl WindowBackend for MemoryBackend {
    async fn execute(&self, eval: &Evaluation) -> Result<Verdict> {
        let verdict = self.execute_locked(eval);
        trace!(key = %eval.key, now = eval.now, ?verdict, "Executed window check in memory");
        // The key's entry lock is released by now; the sweep takes shard locks.
        self.sweep_if_due(eval.now);
        Ok(verdict)
    }

    async fn usage(&self, key: &str, now: i64) -> Result<WindowUsage> {
        let counts = match self.keys.get(key) {
            Some(state) => Window::ALL.map(|w| state.live_count(w, now)),
            None => [0; 4],
        };
        Ok(WindowUsage::from_counts(counts))
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.keys.remove(key);
        Ok(())
    }
}
