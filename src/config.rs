//! Configuration Module
//!
//! Engine settings consumed by the shard manager and every per-shard store.
//! Values come from defaults, optionally overridden by `SHARDKV_*` environment
//! variables; the binary layers its command-line flags on top.

use crate::error::ConfigError;
use crate::storage::StoreConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on the number of shards a manager will create.
pub const MAX_SHARDS: usize = 128;

/// Eviction policy applied by every shard's store when its key limit is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionPolicy {
    /// Delete the first key in iteration order.
    SimpleFirst,
    /// Delete keys in hash-randomized iteration order.
    AllKeysRandom,
    /// Pool-based approximated least-recently-used.
    AllKeysLru,
    /// Pool-based approximated least-frequently-used.
    AllKeysLfu,
    /// Full-scan batch eviction of the exact least-recently-used keys.
    BatchKeysLru,
}

impl EvictionPolicy {
    /// Returns the configuration name of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::SimpleFirst => "simple-first",
            EvictionPolicy::AllKeysRandom => "allkeys-random",
            EvictionPolicy::AllKeysLru => "allkeys-lru",
            EvictionPolicy::AllKeysLfu => "allkeys-lfu",
            EvictionPolicy::BatchKeysLru => "batch_keys_lru",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple-first" => Ok(EvictionPolicy::SimpleFirst),
            "allkeys-random" => Ok(EvictionPolicy::AllKeysRandom),
            "allkeys-lru" => Ok(EvictionPolicy::AllKeysLru),
            "allkeys-lfu" => Ok(EvictionPolicy::AllKeysLfu),
            "batch_keys_lru" | "batch-keys-lru" => Ok(EvictionPolicy::BatchKeysLru),
            _ => Err(ConfigError::Parse {
                var: "eviction_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Total key capacity across all shards
    pub keys_limit: usize,
    /// Fraction of capacity freed per eviction pass
    pub eviction_ratio: f64,
    /// Policy used when a shard reaches its share of `keys_limit`
    pub eviction_policy: EvictionPolicy,
    /// How often each shard runs active expiration
    pub shard_cron_frequency: Duration,
    /// Decay tuning for the probabilistic LFU counter
    pub lfu_log_factor: u32,
    /// Number of shards the keyspace is split into
    pub num_shards: usize,
    /// Capacity of each shard's request queue
    pub shard_request_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keys_limit: 200_000_000,
            eviction_ratio: 0.9,
            eviction_policy: EvictionPolicy::BatchKeysLru,
            shard_cron_frequency: Duration::from_secs(1),
            lfu_log_factor: 10,
            num_shards: default_shard_count(),
            shard_request_buffer: 1000,
        }
    }
}

fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_SHARDS)
}

impl Config {
    /// Loads configuration from `SHARDKV_*` environment variables.
    ///
    /// # Environment Variables
    /// - `SHARDKV_KEYS_LIMIT` - total key capacity (default: 200000000)
    /// - `SHARDKV_EVICTION_RATIO` - fraction freed per pass (default: 0.9)
    /// - `SHARDKV_EVICTION_POLICY` - policy name (default: batch_keys_lru)
    /// - `SHARDKV_SHARD_CRON_FREQUENCY_MS` - cron period in ms (default: 1000)
    /// - `SHARDKV_LFU_LOG_FACTOR` - LFU counter decay (default: 10)
    /// - `SHARDKV_NUM_SHARDS` - shard count (default: available cores)
    ///
    /// Unset variables fall back to defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let cron_ms = parse_var(
            &lookup,
            "SHARDKV_SHARD_CRON_FREQUENCY_MS",
            defaults.shard_cron_frequency.as_millis() as u64,
        )?;

        let config = Self {
            keys_limit: parse_var(&lookup, "SHARDKV_KEYS_LIMIT", defaults.keys_limit)?,
            eviction_ratio: parse_var(&lookup, "SHARDKV_EVICTION_RATIO", defaults.eviction_ratio)?,
            eviction_policy: match lookup("SHARDKV_EVICTION_POLICY") {
                Some(raw) => raw.parse().map_err(|_| ConfigError::Parse {
                    var: "SHARDKV_EVICTION_POLICY".to_string(),
                    value: raw,
                })?,
                None => defaults.eviction_policy,
            },
            shard_cron_frequency: Duration::from_millis(cron_ms),
            lfu_log_factor: parse_var(&lookup, "SHARDKV_LFU_LOG_FACTOR", defaults.lfu_log_factor)?,
            num_shards: parse_var(&lookup, "SHARDKV_NUM_SHARDS", defaults.num_shards)?,
            shard_request_buffer: defaults.shard_request_buffer,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.eviction_ratio) {
            return Err(ConfigError::Invalid {
                field: "eviction_ratio",
                reason: format!("{} is not within [0, 1]", self.eviction_ratio),
            });
        }
        if self.num_shards == 0 || self.num_shards > MAX_SHARDS {
            return Err(ConfigError::Invalid {
                field: "num_shards",
                reason: format!("{} is not within [1, {}]", self.num_shards, MAX_SHARDS),
            });
        }
        if self.shard_cron_frequency.is_zero() {
            return Err(ConfigError::Invalid {
                field: "shard_cron_frequency",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.shard_request_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "shard_request_buffer",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Per-shard store settings when the keyspace is split `shard_count` ways.
    ///
    /// Each shard gets `ceil(keys_limit / shard_count)` keys, never less than one.
    pub fn store_config(&self, shard_count: usize) -> StoreConfig {
        let shard_count = shard_count.max(1);
        StoreConfig {
            keys_limit: self.keys_limit.div_ceil(shard_count).max(1),
            eviction_ratio: self.eviction_ratio,
            lfu_log_factor: self.lfu_log_factor,
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Parse {
            var: name.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}
