//! Server-side check-and-record script and its reply format.

use redis::Value;

use super::backend::{Verdict, Violation};
use super::window::Window;
use crate::error::{RatewardenError, Result};

/// Lua run atomically by Redis for one check.
///
/// KEYS[1..4] are the per_second, per_minute, per_hour and per_day marker
/// sets. ARGV[1] is the caller's clock in unix seconds, ARGV[2..5] the
/// limits in the same order and ARGV[6] the marker to record.
///
/// Reply: `{accepted, window_name, window_seconds, count, limit}`.
///
/// Lua numbers are doubles, so limits are only exact up to
/// [`MAX_LIMIT`](super::window::MAX_LIMIT); `WindowConfig` caps them there.
pub const CHECK_AND_RECORD: &str = r"
local now = tonumber(ARGV[1])
local marker = ARGV[6]
local names = {'per_second', 'per_minute', 'per_hour', 'per_day'}
local spans = {1, 60, 3600, 86400}

for i = 1, 4 do
    local limit = tonumber(ARGV[i + 1])
    if limit > 0 then
        redis.call('ZREMRANGEBYSCORE', KEYS[i], '-inf', now - spans[i])
        local count = redis.call('ZCARD', KEYS[i])
        if count >= limit then
            return {0, names[i], spans[i], count, limit}
        end
    end
end

for i = 1, 4 do
    if tonumber(ARGV[i + 1]) > 0 then
        redis.call('ZADD', KEYS[i], now, marker)
        redis.call('EXPIRE', KEYS[i], spans[i] + 1)
    end
end

return {1, '', 0, 0, 0}
";

/// Decode the reply of [`CHECK_AND_RECORD`].
pub fn parse_verdict(value: Value) -> Result<Verdict> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(malformed(format!("expected array, got {:?}", other))),
    };
    if items.len() != 5 {
        return Err(malformed(format!("expected 5 elements, got {}", items.len())));
    }

    if int_at(&items, 0, "accepted flag")? != 0 {
        return Ok(Verdict::Accepted);
    }

    let name = string_at(&items, 1, "window name")?;
    let window = Window::from_name(&name)
        .ok_or_else(|| malformed(format!("unknown window {:?}", name)))?;
    let seconds = unsigned_at(&items, 2, "window seconds")?;
    if seconds != window.seconds() {
        return Err(malformed(format!(
            "window {} reported as {}s",
            window.name(),
            seconds
        )));
    }

    Ok(Verdict::Rejected(Violation {
        window,
        count: unsigned_at(&items, 3, "count")?,
        limit: unsigned_at(&items, 4, "limit")?,
    }))
}

fn malformed(msg: String) -> RatewardenError {
    RatewardenError::MalformedReply(msg)
}

fn int_at(items: &[Value], index: usize, what: &str) -> Result<i64> {
    match &items[index] {
        Value::Int(n) => Ok(*n),
        other => Err(malformed(format!("{} is not an integer: {:?}", what, other))),
    }
}

fn unsigned_at(items: &[Value], index: usize, what: &str) -> Result<u64> {
    let n = int_at(items, index, what)?;
    u64::try_from(n).map_err(|_| malformed(format!("{} is negative: {}", what, n)))
}

fn string_at(items: &[Value], index: usize, what: &str) -> Result<String> {
    match &items[index] {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone())
            .map_err(|_| malformed(format!("{} is not utf-8", what))),
        Value::SimpleString(s) => Ok(s.clone()),
        other => Err(malformed(format!("{} is not a string: {:?}", what, other))),
    }
}
