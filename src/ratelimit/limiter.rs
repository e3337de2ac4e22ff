//! Multi-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::backend::{Evaluation, Verdict, WindowBackend, WindowUsage};
use super::clock::{Clock, SystemClock};
use super::key::new_marker;
use super::window::WindowConfig;
use crate::error::{LimitError, RateLimitExceeded, RatewardenError, Result};

/// Admission check for a rate limit key.
///
/// Object safe so callers (middleware, handlers) can hold an
/// `Arc<dyn Limiter>` without knowing the store.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Admit or deny one request for `key`.
    ///
    /// `None` means no limits apply; the call always succeeds without
    /// touching the store.
    async fn allow(
        &self,
        key: &str,
        config: Option<&WindowConfig>,
    ) -> std::result::Result<(), LimitError>;
}

/// Sliding-window rate limiter over a shared [`WindowBackend`].
///
/// Holds no per-key state: every call is a single atomic round trip to the
/// backend, so any number of instances may share one store.
pub struct RateLimiter<B> {
    backend: B,
    clock: Arc<dyn Clock>,
    timeout: Option<Duration>,
}

impl<B: WindowBackend> RateLimiter<B> {
    /// Create a rate limiter using the wall clock and no call timeout.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            timeout: None,
        }
    }

    /// Replace the clock used for window boundaries.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound every store call. A call that overruns fails with
    /// [`RatewardenError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Admit or deny one request for `key`.
    ///
    /// Windows are checked tightest first and the first full one is
    /// reported; a denied request is not counted in any window.
    pub async fn allow(
        &self,
        key: &str,
        config: Option<&WindowConfig>,
    ) -> std::result::Result<(), LimitError> {
        let limits = match config {
            Some(config) if !config.is_unconstrained() => *config,
            _ => return Ok(()),
        };

        let now = self.clock.now_unix();
        let eval = Evaluation {
            key: key.to_string(),
            now,
            limits,
            marker: new_marker(now),
        };

        trace!(
            key = %key,
            now = now,
            per_second = limits.per_second,
            per_minute = limits.per_minute,
            per_hour = limits.per_hour,
            per_day = limits.per_day,
            "Checking rate limit"
        );

        match self.bounded(self.backend.execute(&eval)).await? {
            Verdict::Accepted => Ok(()),
            Verdict::Rejected(violation) => {
                debug!(
                    key = %key,
                    window = %violation.window,
                    count = violation.count,
                    limit = violation.limit,
                    "Rate limit exceeded"
                );
                Err(LimitError::Exceeded(RateLimitExceeded {
                    key: key.to_string(),
                    window: violation.window,
                    current: violation.count,
                    limit: violation.limit,
                }))
            }
        }
    }

    /// Live marker counts for `key` at the current time.
    pub async fn usage(&self, key: &str) -> Result<WindowUsage> {
        let now = self.clock.now_unix();
        self.bounded(self.backend.usage(key, now)).await
    }

    /// Forget everything recorded for `key`.
    pub async fn reset(&self, key: &str) -> Result<()> {
        debug!(key = %key, "Resetting rate limit state");
        self.bounded(self.backend.reset(key)).await
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RatewardenError::Timeout(limit))?,
            None => call.await,
        }
    }
}

#[async_trait]
impl<B: WindowBackend> Limiter for RateLimiter<B> {
    async fn allow(
        &self,
        key: &str,
        config: Option<&WindowConfig>,
    ) -> std::result::Result<(), LimitError> {
        RateLimiter::allow(self, key, config).await
    }
}

impl<B: std::fmt::Debug> std::fmt::Debug for RateLimiter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.backend)
            .field("clock", &self.clock)
            .field("timeout", &self.timeout)
            .finish()
    }
}
