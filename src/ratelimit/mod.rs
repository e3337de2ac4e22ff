//! Multi-window sliding rate limiting.

mod backend;
mod clock;
mod key;
mod limiter;
mod memory;
mod redis_backend;
mod script;
mod window;

pub use backend::{Evaluation, Verdict, Violation, WindowBackend, WindowUsage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{new_marker, StorageKeys, DEFAULT_KEY_PREFIX};
pub use limiter::{Limiter, RateLimiter};
pub use memory::{MemoryBackend, SWEEP_INTERVAL_SECS};
pub use redis_backend::RedisBackend;
pub use script::{parse_verdict, CHECK_AND_RECORD};
pub use window::{Window, WindowConfig, MAX_LIMIT};
