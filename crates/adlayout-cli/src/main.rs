//! adlayout - overlay placement for product photographs
//!
//! Command-line shell around `adlayout_core`: place one layout, evaluate model
//! proposals over an image set, or rebuild the summary from a saved report.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use rayon::ThreadPoolBuilder;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::aggregate::AggregateCommand;
use commands::evaluate::EvaluateCommand;
use commands::place::PlaceCommand;

#[derive(Parser)]
#[command(
    name = "adlayout",
    version,
    about = "Headline and logo placement for product photos",
    after_help = "EXAMPLES:\n  \
                  # Place one layout, synthesizing a headline sized for ~24 characters\n  \
                  adlayout place --image shoe.png --layout shoe.json --text-chars 24 --out shoe.out.json\n\n  \
                  # Compare two models over an image set\n  \
                  adlayout evaluate --images imgs/*.png --predictions base=out/base --predictions lora=out/lora --out-dir report\n\n  \
                  # Rebuild the summary from an existing report\n  \
                  adlayout aggregate --report report/compare_report.csv"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full placement pipeline on one image
    Place(PlaceCommand),

    /// Score model proposals over a set of images (parallel)
    Evaluate(EvaluateCommand),

    /// Recompute the per-model summary from a report CSV
    Aggregate(AggregateCommand),
}

fn main() -> Result<()> {
    // Lets batch runs on shared machines cap the worker count
    if let Ok(threads) = std::env::var("ADLAYOUT_THREADS") {
        if let Ok(n) = threads.parse::<usize>() {
            ThreadPoolBuilder::new().num_threads(n).build_global().ok();
        }
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Place(cmd) => cmd.execute(),
        Commands::Evaluate(cmd) => cmd.execute(),
        Commands::Aggregate(cmd) => cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::parse_from(["adlayout", "aggregate", "--report", "r.csv", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Aggregate(_)));
    }
}
