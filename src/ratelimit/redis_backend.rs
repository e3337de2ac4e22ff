//! Redis window store.
//!
//! Every check is one `EVALSHA` of [`CHECK_AND_RECORD`] (falling back to
//! `EVAL` when the server has not cached the script yet). Redis runs the
//! script without interleaving other commands, which is what keeps
//! concurrent callers on different hosts from both slipping under a limit.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script, Value};
use tracing::{info, trace};

use super::backend::{window_floor, Evaluation, Verdict, WindowBackend, WindowUsage};
use super::key::{StorageKeys, DEFAULT_KEY_PREFIX};
use super::script::{parse_verdict, CHECK_AND_RECORD};
use super::window::Window;
use crate::config::StoreConfig;
use crate::error::{RatewardenError, Result};

/// A [`WindowBackend`] backed by Redis sorted sets.
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
    script: Script,
    prefix: String,
}

impl RedisBackend {
    /// Connect using the store section of the configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = Client::open(config.redis_url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        info!(
            prefix = %config.key_prefix,
            "Connected to Redis window store"
        );

        Ok(Self::with_connection(conn, &config.key_prefix))
    }

    /// Wrap an existing connection.
    pub fn with_connection(conn: MultiplexedConnection, prefix: &str) -> Self {
        let prefix = if prefix.is_empty() {
            DEFAULT_KEY_PREFIX
        } else {
            prefix
        };
        Self {
            conn,
            script: Script::new(CHECK_AND_RECORD),
            prefix: prefix.to_string(),
        }
    }

    /// Namespace the backend writes under.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl WindowBackend for RedisBackend {
    async fn execute(&self, eval: &Evaluation) -> Result<Verdict> {
        if eval.limits.is_unconstrained() {
            return Ok(Verdict::Accepted);
        }

        let keys = StorageKeys::new(&self.prefix, &eval.key);

        let mut invocation = self.script.prepare_invoke();
        for key in keys.all() {
            invocation.key(key);
        }
        invocation.arg(eval.now);
        for limit in eval.limits.limits() {
            invocation.arg(limit);
        }
        invocation.arg(&eval.marker);

        let mut conn = self.conn.clone();
        let reply: Value = invocation.invoke_async(&mut conn).await?;

        let verdict = parse_verdict(reply)?;
        trace!(key = %eval.key, now = eval.now, ?verdict, "Executed window script");
        Ok(verdict)
    }

    async fn usage(&self, key: &str, now: i64) -> Result<WindowUsage> {
        let keys = StorageKeys::new(&self.prefix, key);

        let mut pipe = redis::pipe();
        for window in Window::ALL {
            pipe.zcount(keys.get(window), window_floor(now, window), "+inf");
        }

        let mut conn = self.conn.clone();
        let counts: Vec<u64> = pipe.query_async(&mut conn).await?;
        let counts: [u64; 4] = counts.try_into().map_err(|v: Vec<u64>| {
            RatewardenError::MalformedReply(format!("expected 4 counts, got {}", v.len()))
        })?;

        Ok(WindowUsage::from_counts(counts))
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let keys = StorageKeys::new(&self.prefix, key);
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys.all().as_slice()).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("prefix", &self.prefix)
            .finish()
    }
}
