//! Unlock command - remove a lock marker left behind by a crashed writer.

use anyhow::{bail, Result};
use colored::Colorize;

use extension_recommender::storage::lock::process_exists;
use extension_recommender::Config;

use crate::cli::open_store;

/// Arguments for the unlock command.
#[derive(clap::Args)]
pub struct Args {
    /// Remove the marker even if its holder looks alive
    #[arg(long)]
    pub force: bool,
}

/// Executes the unlock command.
///
/// Without `--force`, only removes a marker whose holder process is gone.
pub fn run(args: Args, config: &Config) -> Result<()> {
    let store = open_store(config);
    let lock = store.lock_manager();

    if !lock.is_locked() {
        println!("{}", "No lock held".green());
        return Ok(());
    }

    if !args.force {
        match lock.holder() {
            Some(holder) if process_exists(holder.pid) => {
                bail!(
                    "Lock is held by running process {} (use --force to remove anyway)",
                    holder.pid
                );
            }
            Some(_) => {}
            None => {
                bail!("Lock holder cannot be determined (use --force to remove anyway)");
            }
        }
    }

    if lock.force_release()? {
        println!("{} {}", "Removed lock".yellow(), lock.path().display());
    } else {
        println!("{}", "Lock was released in the meantime".green());
    }
    Ok(())
}
