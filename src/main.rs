//! ShardKV - A Sharded In-Memory Storage Engine
//!
//! This is the main entry point for the ShardKV engine.
//! It loads configuration, starts every shard and runs until SIGINT or
//! SIGTERM.

use shardkv::config::{Config, EvictionPolicy};
use shardkv::shard::ShardManager;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Applies command-line arguments on top of `config`.
fn apply_args(mut config: Config) -> Config {
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--shards" | "-s" => {
                config.num_shards = parse_value(&args, i, "--shards");
                i += 2;
            }
            "--keys-limit" | "-k" => {
                config.keys_limit = parse_value(&args, i, "--keys-limit");
                i += 2;
            }
            "--eviction-policy" | "-e" => {
                config.eviction_policy = parse_value::<EvictionPolicy>(&args, i, "--eviction-policy");
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("ShardKV version {}", shardkv::VERSION);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    config
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    let Some(raw) = args.get(i + 1) else {
        eprintln!("Error: {} requires a value", flag);
        std::process::exit(1);
    };
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {}: {}", flag, raw);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
ShardKV - A Sharded In-Memory Storage Engine

USAGE:
    shardkv [OPTIONS]

OPTIONS:
    -s, --shards <N>                 Number of shards (default: available cores)
    -k, --keys-limit <N>             Total key capacity (default: 200000000)
    -e, --eviction-policy <POLICY>   simple-first | allkeys-random | allkeys-lru |
                                     allkeys-lfu | batch_keys_lru (default)
    -v, --version                    Print version information
    -h, --help                       Print this help message

ENVIRONMENT:
    SHARDKV_KEYS_LIMIT, SHARDKV_EVICTION_RATIO, SHARDKV_EVICTION_POLICY,
    SHARDKV_SHARD_CRON_FREQUENCY_MS, SHARDKV_LFU_LOG_FACTOR, SHARDKV_NUM_SHARDS
    RUST_LOG controls log verbosity (default: info)

EXAMPLES:
    shardkv                                  # One shard per core
    shardkv --shards 8 --keys-limit 1000000
    shardkv --eviction-policy allkeys-lfu
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Flags override the environment, which overrides defaults
    let config = apply_args(Config::from_env()?);

    // Set up logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!(
        version = shardkv::VERSION,
        shards = config.num_shards,
        keys_limit = config.keys_limit,
        eviction_ratio = config.eviction_ratio,
        policy = %config.eviction_policy,
        "ShardKV starting"
    );

    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let manager = Arc::new(ShardManager::new(config.num_shards, &config, error_tx));

    // dropping the sender stops the shards, so it lives until exit
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut runner = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.run(shutdown_rx).await }
    });

    info!("Use Ctrl+C (or send SIGTERM) to shutdown gracefully");
    loop {
        tokio::select! {
            result = &mut runner => {
                result?;
                break;
            }
            Some(err) = error_rx.recv() => {
                error!(shard_id = err.shard_id(), error = %err, "Shard failure");
            }
        }
    }

    while let Ok(err) = error_rx.try_recv() {
        error!(shard_id = err.shard_id(), error = %err, "Shard failure during shutdown");
    }

    info!("Shutdown complete");
    Ok(())
}
