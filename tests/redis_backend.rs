//! Runs the limiter against a real Redis started in a container.
//!
//! Needs Docker: `cargo test -- --ignored`.

use std::sync::Arc;

use redis::AsyncCommands;
use testcontainers::{core::WaitFor, runners::AsyncRunner, ContainerAsync, GenericImage};

use ratewarden::config::StoreConfig;
use ratewarden::ratelimit::{
    new_marker, parse_verdict, ManualClock, RateLimiter, RedisBackend, StorageKeys, Verdict,
    Window, WindowConfig, CHECK_AND_RECORD,
};
use ratewarden::LimitError;

const T0: i64 = 1_700_000_000;

struct Harness {
    _container: ContainerAsync<GenericImage>,
    url: String,
    limiter: RateLimiter<RedisBackend>,
    clock: Arc<ManualClock>,
}

async fn start_redis() -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("redis", "7-alpine")
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .expect("Failed to start Redis container");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get port");
    let url = format!("redis://127.0.0.1:{}", port);
    (container, url)
}

fn store_config(url: &str) -> StoreConfig {
    StoreConfig {
        redis_url: url.to_string(),
        key_prefix: "ratewarden_test".to_string(),
        ..StoreConfig::default()
    }
}

async fn harness() -> Harness {
    let (container, url) = start_redis().await;
    let backend = RedisBackend::connect(&store_config(&url))
        .await
        .expect("Failed to connect to Redis");
    let clock = Arc::new(ManualClock::new(T0));
    Harness {
        _container: container,
        url,
        limiter: RateLimiter::new(backend).with_clock(clock.clone()),
        clock,
    }
}

fn window_of(result: Result<(), LimitError>) -> Window {
    match result {
        Err(LimitError::Exceeded(e)) => e.window,
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
#[ignore = "requires Docker for Redis container"]
async fn test_per_second_round_trip() {
    let h = harness().await;
    let config = WindowConfig::new().per_second(3);

    for _ in 0..3 {
        h.limiter.allow("u1", Some(&config)).await.unwrap();
    }

    match h.limiter.allow("u1", Some(&config)).await {
        Err(LimitError::Exceeded(e)) => {
            assert_eq!(e.window_name(), "per_second");
            assert_eq!(e.current, 3);
            assert_eq!(e.limit, 3);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
#[ignore = "requires Docker for Redis container"]
async fn test_first_violated_window_wins() {
    let h = harness().await;
    let config = WindowConfig::new().per_second(2).per_minute(5);

    h.limiter.allow("multi", Some(&config)).await.unwrap();
    h.limiter.allow("multi", Some(&config)).await.unwrap();
    assert_eq!(window_of(h.limiter.allow("multi", Some(&config)).await), Window::Second);

    let usage = h.limiter.usage("multi").await.unwrap();
    assert_eq!(usage.per_second, 2);
    assert_eq!(usage.per_minute, 2);
}

#[tokio::test]
#[ignore = "requires Docker for Redis container"]
async fn test_sliding_window_recovers() {
    let h = harness().await;
    let config = WindowConfig::new().per_second(2);

    h.limiter.allow("sliding", Some(&config)).await.unwrap();
    h.limiter.allow("sliding", Some(&config)).await.unwrap();
    assert!(h.limiter.allow("sliding", Some(&config)).await.is_err());

    h.clock.advance(1);
    assert!(h.limiter.allow("sliding", Some(&config)).await.is_ok());
}

#[tokio::test]
#[ignore = "requires Docker for Redis container"]
async fn test_per_minute_slides_after_sixty_seconds() {
    let h = harness().await;
    let config = WindowConfig::new().per_minute(2);

    h.limiter.allow("minute", Some(&config)).await.unwrap();
    h.clock.advance(30);
    h.limiter.allow("minute", Some(&config)).await.unwrap();

    h.clock.advance(29);
    assert_eq!(window_of(h.limiter.allow("minute", Some(&config)).await), Window::Minute);

    // T0 + 60: the first marker has left the window, the second has not.
    h.clock.advance(1);
    h.limiter.allow("minute", Some(&config)).await.unwrap();
    assert_eq!(window_of(h.limiter.allow("minute", Some(&config)).await), Window::Minute);
    assert_eq!(h.limiter.usage("minute").await.unwrap().per_minute, 2);
}

#[tokio::test]
#[ignore = "requires Docker for Redis container"]
async fn test_per_hour_slides_after_an_hour() {
    let h = harness().await;
    let config = WindowConfig::new().per_hour(1);

    h.limiter.allow("hour", Some(&config)).await.unwrap();

    h.clock.advance(3599);
    match h.limiter.allow("hour", Some(&config)).await {
        Err(LimitError::Exceeded(e)) => {
            assert_eq!(e.window_name(), "per_hour");
            assert_eq!(e.window_seconds(), 3600);
            assert_eq!(e.current, 1);
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    h.clock.advance(1);
    h.limiter.allow("hour", Some(&config)).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker for Redis container"]
async fn test_unconstrained_script_writes_nothing() {
    let h = harness().await;
    let keys = StorageKeys::new("ratewarden_test", "idle");

    let mut conn = redis::Client::open(h.url.as_str())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();

    let script = redis::Script::new(CHECK_AND_RECORD);
    let mut invocation = script.prepare_invoke();
    for key in keys.all() {
        invocation.key(key);
    }
    invocation
        .arg(T0)
        .arg(0u64)
        .arg(0u64)
        .arg(0u64)
        .arg(0u64)
        .arg(new_marker(T0));
    let reply: redis::Value = invocation.invoke_async(&mut conn).await.unwrap();
    assert_eq!(parse_verdict(reply).unwrap(), Verdict::Accepted);

    h.limiter.allow("idle", Some(&WindowConfig::new())).await.unwrap();
    h.limiter.allow("idle", None).await.unwrap();

    let existing: u64 = conn.exists(keys.all().as_slice()).await.unwrap();
    assert_eq!(existing, 0);
    assert_eq!(h.limiter.usage("idle").await.unwrap().per_day, 0);
}

#[tokio::test]
#[ignore = "requires Docker for Redis container"]
async fn test_reset_clears_every_window() {
    let h = harness().await;
    let config = WindowConfig::new().per_hour(1).per_day(1);

    h.limiter.allow("reset", Some(&config)).await.unwrap();
    h.limiter.reset("reset").await.unwrap();

    assert_eq!(h.limiter.usage("reset").await.unwrap().per_day, 0);
    assert!(h.limiter.allow("reset", Some(&config)).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker for Redis container"]
async fn test_concurrent_callers_across_connections() {
    let h = harness().await;

    // Separate connections stand in for separate processes.
    let mut limiters = Vec::new();
    for _ in 0..5 {
        let backend = RedisBackend::connect(&store_config(&h.url)).await.unwrap();
        limiters.push(Arc::new(
            RateLimiter::new(backend).with_clock(Arc::new(ManualClock::new(T0))),
        ));
    }

    let config = WindowConfig::new().per_second(1);
    let calls = (0..50).map(|i| {
        let limiter = limiters[i % limiters.len()].clone();
        tokio::spawn(async move { limiter.allow("hot", Some(&config)).await })
    });

    let mut accepted = 0;
    for result in futures::future::join_all(calls).await {
        match result.unwrap() {
            Ok(()) => accepted += 1,
            Err(e) => assert!(e.is_rate_limited(), "unexpected failure: {}", e),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(h.limiter.usage("hot").await.unwrap().per_second, 1);
}
