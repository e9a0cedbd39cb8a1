//! List command - show stored recommendations.

use anyhow::Result;
use colored::Colorize;

use extension_recommender::{Config, Recommendation};

use crate::cli::{block_on, open_store, OutputFormat};

/// Arguments for the list command.
#[derive(clap::Args)]
#[command(after_help = "EXAMPLES:\n    \
    recommender list                     List every recommendation\n    \
    recommender list --target pub.ext    Only recommendations of pub.ext\n    \
    recommender list --format json       Output as JSON")]
pub struct Args {
    /// Only show recommendations of this extension
    #[arg(short, long, value_name = "ID")]
    pub target: Option<String>,

    /// Output format: text (default), json
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Executes the list command.
pub fn run(args: Args, config: &Config) -> Result<()> {
    let store = open_store(config);
    let model = block_on(store.read())??;

    let recommendations: Vec<Recommendation> = model
        .map(|m| m.recommendations)
        .unwrap_or_default()
        .into_iter()
        .filter(|r| args.target.as_deref().map_or(true, |t| r.extension_id == t))
        .collect();

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&recommendations)?);
        }
        OutputFormat::Text => print_text(&recommendations),
    }

    Ok(())
}

fn print_text(recommendations: &[Recommendation]) {
    if recommendations.is_empty() {
        println!("{}", "No recommendations found.".dimmed());
        return;
    }

    for rec in recommendations {
        let mut flags = Vec::new();
        if rec.should_show_on_startup {
            flags.push("startup".cyan());
        }
        if rec.user_ignored {
            flags.push("ignored".red());
        }
        let flags = flags
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(" ");

        println!(
            "  {} -> {}  {}  {}",
            rec.source_id.yellow(),
            rec.extension_id.green(),
            format!("\"{}\"", rec.extension_display_name).bold(),
            flags
        );
        if !rec.description.is_empty() {
            println!("      {}", rec.description.dimmed());
        }
    }

    println!();
    println!("{} recommendation(s)", recommendations.len());
}
