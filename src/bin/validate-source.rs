use anyhow::{Context, Result};
use clap::Parser;
use std::{fs, path::PathBuf};

use igs_analytics::config::AppConfig;
use igs_analytics::pipeline::IngestionPipeline;

/// Dry-run a source file through header detection and normalization.
/// Nothing is written to any store.
#[derive(Parser, Debug)]
#[command(name = "validate-source", version, about = "Validate an IGS source file without loading it")]
struct Cli {
    /// Path to the source CSV
    path: PathBuf,

    /// Print the full report including every rejected row
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let config = AppConfig::load()?;

    let bytes = fs::read(&args.path).with_context(|| format!("Failed to read {}", args.path.display()))?;
    let pipeline = IngestionPipeline::new(&config.ingest);

    match pipeline.prepare(&bytes, Some(&args.path.display().to_string())) {
        Ok(prepared) => {
            let mut report = prepared.report;
            if !args.verbose {
                report.rejection_reasons.clear();
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.rows_rejected > 0 {
                eprintln!(
                    "{} of {} rows would be rejected",
                    report.rows_rejected, report.rows_read
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("invalid: {e}");
            std::process::exit(1);
        }
    }
}
