//! Ratewarden - Distributed Sliding-Window Rate Limiter
//!
//! This crate admits or denies requests against up to four trailing windows
//! (second, minute, hour, day) per key. Window state lives in Redis and each
//! check is a single atomic script call, so any number of processes can
//! share the same limits without coordinating with each other.

pub mod config;
pub mod error;
pub mod logging;
pub mod ratelimit;

pub use error::{LimitError, RateLimitExceeded, RatewardenError};
pub use ratelimit::{Limiter, RateLimiter, Window, WindowConfig};
