//! Error Types
//!
//! Every fallible operation in the engine returns one of the enums below.
//! Missing or expired keys are never errors: the store reports them as `None`.

use thiserror::Error;

/// Errors returned by [`Store`](crate::storage::Store) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An expiry sub-flag other than NX, XX, GT or LT was supplied.
    #[error("ERR Unsupported option {0}")]
    UnsupportedExpiryOption(String),

    /// Two expiry sub-flags that cannot be combined were supplied together.
    #[error("ERR {0}")]
    IncompatibleExpiryOptions(&'static str),

    /// A glob pattern passed to `keys` could not be parsed.
    #[error("ERR bad pattern: {0}")]
    BadPattern(String),
}

/// Errors raised by the shard layer.
#[derive(Error, Debug)]
pub enum ShardError {
    /// The shard is not accepting work, or stopped before it could reply.
    #[error("shard {shard_id} is not running")]
    Stopped { shard_id: usize },

    /// A unit of work panicked and took the shard's loop down with it.
    #[error("shard {shard_id} panicked while executing a command")]
    Panicked { shard_id: usize },

    /// `start` was called on a shard whose loop is already running or done.
    #[error("shard {shard_id} was already started")]
    AlreadyStarted { shard_id: usize },

    /// The cleanup hook failed while the shard was draining.
    #[error("shard {shard_id} cleanup failed: {source}")]
    Cleanup {
        shard_id: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl ShardError {
    /// Returns the id of the shard the error originated from.
    pub fn shard_id(&self) -> usize {
        match self {
            ShardError::Stopped { shard_id }
            | ShardError::Panicked { shard_id }
            | ShardError::AlreadyStarted { shard_id }
            | ShardError::Cleanup { shard_id, .. } => *shard_id,
        }
    }
}

/// Errors produced while loading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A value was present but could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    Parse { var: String, value: String },

    /// A parsed value is outside its allowed range.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
