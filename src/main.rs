use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use ratewarden::config::RatewardenConfig;
use ratewarden::ratelimit::{RateLimiter, RedisBackend, Window, WindowConfig};
use ratewarden::{logging, LimitError};

/// Exit code when at least one check was denied.
const EXIT_LIMITED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "ratewarden", version, about = "Operate a Redis-backed sliding-window rate limiter")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run admission checks for a key and report each outcome
    Check {
        #[arg(short, long)]
        key: String,
        #[arg(long, default_value_t = 0)]
        per_second: u64,
        #[arg(long, default_value_t = 0)]
        per_minute: u64,
        #[arg(long, default_value_t = 0)]
        per_hour: u64,
        #[arg(long, default_value_t = 0)]
        per_day: u64,
        /// Number of checks to run
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Show live marker counts per window
    Inspect {
        #[arg(short, long)]
        key: String,
    },
    /// Delete all window state for a key
    Reset {
        #[arg(short, long)]
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = RatewardenConfig::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ratewarden");

    let backend = RedisBackend::connect(&config.store)
        .await
        .context("connecting to the window store")?;
    let mut limiter = RateLimiter::new(backend);
    if let Some(timeout) = config.store.command_timeout() {
        limiter = limiter.with_timeout(timeout);
    }

    match cli.command {
        Command::Check {
            key,
            per_second,
            per_minute,
            per_hour,
            per_day,
            count,
        } => {
            let limits = WindowConfig::new()
                .per_second(per_second)
                .per_minute(per_minute)
                .per_hour(per_hour)
                .per_day(per_day);
            check(&limiter, &key, &limits, count, cli.json).await
        }
        Command::Inspect { key } => {
            let usage = limiter.usage(&key).await?;
            if cli.json {
                println!("{}", json!({ "key": key, "usage": usage }));
            } else {
                for window in Window::ALL {
                    println!("{:<11} {}", window.name(), usage.get(window));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Reset { key } => {
            limiter.reset(&key).await?;
            if cli.json {
                println!("{}", json!({ "key": key, "reset": true }));
            } else {
                println!("reset {}", key);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn check(
    limiter: &RateLimiter<RedisBackend>,
    key: &str,
    limits: &WindowConfig,
    count: u32,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let mut limited = false;

    for attempt in 1..=count {
        match limiter.allow(key, Some(limits)).await {
            Ok(()) => {
                if json {
                    println!("{}", json!({ "attempt": attempt, "allowed": true }));
                } else {
                    println!("#{} allowed", attempt);
                }
            }
            Err(LimitError::Exceeded(e)) => {
                limited = true;
                if json {
                    println!(
                        "{}",
                        json!({
                            "attempt": attempt,
                            "allowed": false,
                            "window": e.window_name(),
                            "window_seconds": e.window_seconds(),
                            "current": e.current,
                            "limit": e.limit,
                        })
                    );
                } else {
                    println!("#{} {}", attempt, e);
                }
            }
            Err(e @ LimitError::Evaluation(_)) => {
                return Err(e).with_context(|| format!("checking {}", key));
            }
        }
    }

    Ok(if limited {
        ExitCode::from(EXIT_LIMITED)
    } else {
        ExitCode::SUCCESS
    })
}
