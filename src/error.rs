//! Error types for Ratewarden.

use std::time::Duration;

use thiserror::Error;

use crate::ratelimit::Window;

/// Infrastructure error: the limiter could not reach a decision.
#[derive(Error, Debug)]
pub enum RatewardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store rejected the command or could not be reached
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The atomic script answered with something other than a verdict
    #[error("Malformed store reply: {0}")]
    MalformedReply(String),

    /// The store round trip did not finish in time
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratewarden operations.
pub type Result<T> = std::result::Result<T, RatewardenError>;

/// A request was denied because one of its windows is full.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "rate limit exceeded: key={key}, window={}({}s), current={current}, limit={limit}",
    .window.name(),
    .window.seconds()
)]
pub struct RateLimitExceeded {
    /// The throttled key
    pub key: String,
    /// The first window, in evaluation order, that was full
    pub window: Window,
    /// Markers present in the window when the request was denied
    pub current: u64,
    /// The configured limit for the window
    pub limit: u64,
}

impl RateLimitExceeded {
    /// Canonical window name, e.g. `per_second`.
    pub fn window_name(&self) -> &'static str {
        self.window.name()
    }

    /// Window length in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window.seconds()
    }
}

/// Outcome of a failed [`allow`](crate::ratelimit::RateLimiter::allow) call.
///
/// Callers are expected to match on the variant: `Exceeded` is a normal
/// denial (429-style), `Evaluation` is a fault in the limiter's store.
#[derive(Error, Debug)]
pub enum LimitError {
    #[error(transparent)]
    Exceeded(#[from] RateLimitExceeded),

    #[error("rate limit check failed: {0}")]
    Evaluation(#[from] RatewardenError),
}

impl LimitError {
    /// True when the request was denied by a configured window.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LimitError::Exceeded(_))
    }

    /// The rejection details, if this is a rejection.
    pub fn exceeded(&self) -> Option<&RateLimitExceeded> {
        match self {
            LimitError::Exceeded(e) => Some(e),
            LimitError::Evaluation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceeded_display() {
        let err = RateLimitExceeded {
            key: "sms:aliyun:user:123".to_string(),
            window: Window::Second,
            current: 3,
            limit: 3,
        };
        assert_eq!(
            err.to_string(),
            "rate limit exceeded: key=sms:aliyun:user:123, window=per_second(1s), current=3, limit=3"
        );
    }

    #[test]
    fn test_limit_error_classification() {
        let rejected = LimitError::from(RateLimitExceeded {
            key: "k".to_string(),
            window: Window::Day,
            current: 10,
            limit: 10,
        });
        assert!(rejected.is_rate_limited());
        assert_eq!(rejected.exceeded().map(|e| e.window_seconds()), Some(86400));

        let failed = LimitError::from(RatewardenError::MalformedReply("empty".to_string()));
        assert!(!failed.is_rate_limited());
        assert!(failed.exceeded().is_none());
        assert_eq!(
            failed.to_string(),
            "rate limit check failed: Malformed store reply: empty"
        );
    }
}
