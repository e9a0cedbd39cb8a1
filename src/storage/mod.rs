//! Storage layer for the recommendation model.
//!
//! - `models` - the persisted data structure
//! - `lock` - advisory marker-file lock over the backing directory
//! - `store` - load/merge-or-default/save under the lock

pub mod lock;
pub mod models;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

pub use lock::{LockGuard, LockInfo, LockManager};
pub use models::*;
pub use store::Store;

/// Errors raised by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The lock marker was still present after the wait bound elapsed.
    #[error("Unable to get a lock on {path:?} after {waited:?}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// The model file exists but does not hold a valid model.
    #[error("Failed to decode recommendation model at {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The model could not be serialized.
    #[error("Failed to encode recommendation model: {0}")]
    Encode(#[source] serde_json::Error),

    /// Filesystem error on the backing directory.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mutator passed to `run_with_lock` failed.
    #[error("Model update failed: {0}")]
    Mutator(#[source] anyhow::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
