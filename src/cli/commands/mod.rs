//! CLI commands for the recommender.
//!
//! Each submodule implements a single CLI command with its argument
//! parsing and execution logic.

/// List stored recommendations.
pub mod list;

/// Show store status and lock holder.
pub mod status;

/// Remove a stuck lock marker.
pub mod unlock;
