//! Aggregate mode - rebuild the summary from a saved report

use std::path::PathBuf;

use adlayout_core::aggregate;
use adlayout_core::aggregate::{read_report_csv, write_summary_json};
use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct AggregateCommand {
    /// Report written by `evaluate`
    #[arg(long)]
    report: PathBuf,

    /// Summary path (stdout when omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

impl AggregateCommand {
    pub fn execute(self) -> Result<()> {
        let rows = read_report_csv(&self.report)
            .with_context(|| format!("Failed to read report {}", self.report.display()))?;
        info!("Loaded {} rows from {}", rows.len(), self.report.display());
        let summary = aggregate(&rows);
        match &self.out {
            Some(path) => {
                write_summary_json(path, &summary)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote summary to {}", path.display());
            }
            None => println!("{}", serde_json::to_string_pretty(&summary)?),
        }
        Ok(())
    }
}
