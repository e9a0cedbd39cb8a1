//! Status command - show the state of the recommendation store.
//!
//! Displays where the store lives, whether the model exists, who holds
//! the lock, and a summary of the stored recommendations.

use anyhow::Result;
use colored::Colorize;

use extension_recommender::storage::lock::process_exists;
use extension_recommender::Config;

use crate::cli::{block_on, open_store};

/// Executes the status command.
pub fn run(config: &Config) -> Result<()> {
    let store = open_store(config);
    let lock = store.lock_manager();

    println!("{}", "Extension Recommender".bold().cyan());
    println!("{}", config.storage_dir.display().to_string().dimmed());
    println!();

    println!("{}", "Storage:".bold());
    let model_state = if store.model_path().exists() {
        "present".green()
    } else {
        "missing".yellow()
    };
    println!("  Model:  {model_state}");

    if !lock.is_locked() {
        println!("  Lock:   {}", "free".green());
    } else if let Some(holder) = lock.holder() {
        let liveness = if process_exists(holder.pid) {
            "alive".green()
        } else {
            "not running".red()
        };
        println!(
            "  Lock:   {} by PID {} ({}) since {}",
            "held".yellow(),
            holder.pid,
            liveness,
            holder.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    } else {
        println!("  Lock:   {} (holder unknown)", "held".yellow());
    }

    let Some(model) = block_on(store.read())?? else {
        println!();
        println!(
            "{}",
            "No recommendations have been registered yet.".dimmed()
        );
        return Ok(());
    };

    let targets = model.target_ids();
    let suppressed = targets
        .iter()
        .filter(|t| model.for_target(t).all(|r| r.user_ignored))
        .count();

    println!();
    println!("{}", "Model:".bold());
    println!(
        "  Session:          {} (since {})",
        if model.session_id.is_empty() { "-" } else { model.session_id.as_str() },
        model.session_timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  Last updated:     {}",
        model.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Recommendations:  {}", model.recommendations.len());
    println!("  Targets:          {} ({} suppressed)", targets.len(), suppressed);
    if !model.timelocked.is_empty() {
        println!("  Timelocked:       {}", model.timelocked.join(", "));
    }

    Ok(())
}
