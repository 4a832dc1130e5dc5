use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use evclean::{clean, export, load, schema::CleanPolicies, stats, validate, PipelineError};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Clean a raw EV charging-session CSV export into a typed table"
)]
struct Args {
    /// Path to the raw sessions CSV
    input: PathBuf,

    /// Write the cleaned table as CSV
    #[arg(long)]
    out_csv: Option<PathBuf>,

    /// Write the cleaned table as Parquet
    #[arg(long)]
    out_parquet: Option<PathBuf>,

    /// Write the diagnostic report as JSON (default: stdout)
    #[arg(long)]
    report: Option<PathBuf>,

    /// YAML file overriding per-column missing-value policies
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exit non-zero when post-clean validation fails
    #[arg(long)]
    strict: bool,
}

/// Everything a run has to say, in one serializable blob.
#[derive(Serialize)]
struct RunReport {
    cleaning: clean::CleanReport,
    validation: validate::ValidationReport,
    summaries: Vec<stats::NumericSummary>,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env).init();

    let args = Args::parse();

    // ─── 1) policies ─────────────────────────────────────────────────
    let policies = match &args.config {
        Some(path) => CleanPolicies::from_yaml(path)?,
        None => CleanPolicies::default(),
    };

    // ─── 2) load ─────────────────────────────────────────────────────
    let raw = load::load_sessions_csv(&args.input)?;
    info!(rows = raw.rows.len(), "raw table loaded");

    // ─── 3) clean ────────────────────────────────────────────────────
    let (batch, cleaning) = clean::clean(&raw, &policies)?;
    info!(
        rows_out = cleaning.rows_out,
        dropped_missing = cleaning.dropped_missing_required,
        dropped_bad_timestamp = cleaning.dropped_bad_timestamp,
        dropped_inverted = cleaning.dropped_inverted_duration,
        dropped_duplicate = cleaning.dropped_duplicate,
        "table cleaned"
    );

    // ─── 4) validate ─────────────────────────────────────────────────
    let validation = validate::validate(&batch, &cleaning);
    if !validation.passed() {
        warn!(
            violations = validation.violations.len(),
            "post-clean validation failed"
        );
    }

    // ─── 5) summaries & report ───────────────────────────────────────
    let summaries = stats::summarize_numeric(&batch);
    let run = RunReport {
        cleaning,
        validation,
        summaries,
    };
    let json = serde_json::to_string_pretty(&run).context("serializing run report")?;
    match &args.report {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }

    // ─── 6) optional exports ─────────────────────────────────────────
    if let Some(path) = &args.out_csv {
        export::write_csv(&batch, path)?;
    }
    if let Some(path) = &args.out_parquet {
        export::write_parquet(&batch, path)?;
    }

    if args.strict && !run.validation.passed() {
        return Err(PipelineError::Validation(run.validation.violations.len()).into());
    }
    Ok(())
}
