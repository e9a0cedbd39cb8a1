//! Command-line interface for inspecting a recommendation store.
//!
//! The binary is a maintenance tool. It reads the shared model and can
//! clear a stuck lock, but never changes recommendations.

/// Individual CLI command implementations.
pub mod commands;

/// Output format selection shared by commands.
pub mod format;

pub use format::OutputFormat;

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;

use extension_recommender::host::StaticEnvironment;
use extension_recommender::{Config, Store};

/// Opens the store for read-only inspection. The backing directory is not
/// created if it is missing.
///
/// No host is attached, so the store is given an empty session identity.
pub fn open_store(config: &Config) -> Store {
    Store::at(config, Arc::new(StaticEnvironment::default()))
}

/// Runs a future to completion on a single-threaded runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    Ok(rt.block_on(future))
}
