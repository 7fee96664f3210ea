//! paramsweep - parametric solver sweeps
//!
//! ## Commands
//!
//! - `run`: provision, patch and run every case of a sweep and its dependents
//! - `plan`: show case directories and launch batches without touching disk
//! - `post`: run post-processing stages over existing case directories
//! - `latest`: print the latest snapshot directory of a case

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paramsweep_core::{latest_snapshot, plan, Orchestrator, SweepReport, SweepSpec};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "paramsweep")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parametric sweeps over solver case templates", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sweep and its dependent chain
    Run {
        /// Sweep definition (JSON)
        #[arg(short, long, env = "PARAMSWEEP_CONFIG")]
        config: PathBuf,

        /// Write the JSON report here
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Show case directories and launch batches without running anything
    Plan {
        /// Sweep definition (JSON)
        #[arg(short, long, env = "PARAMSWEEP_CONFIG")]
        config: PathBuf,
    },

    /// Run post-processing stages over existing cases
    Post {
        /// Sweep definition (JSON)
        #[arg(short, long, env = "PARAMSWEEP_CONFIG")]
        config: PathBuf,

        /// Write the JSON report here
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Print the latest snapshot directory of a case
    Latest {
        /// Case directory
        #[arg(long)]
        case: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    paramsweep_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run { config, report } => cmd_run(&config, report.as_deref()).await,
        Commands::Plan { config } => cmd_plan(&config),
        Commands::Post { config, report } => cmd_post(&config, report.as_deref()).await,
        Commands::Latest { case } => cmd_latest(&case),
    }
}

fn load_spec(config: &Path) -> Result<SweepSpec> {
    SweepSpec::load(config)
        .with_context(|| format!("Failed to load sweep definition {}", config.display()))
}

async fn cmd_run(config: &Path, report_path: Option<&Path>) -> Result<()> {
    let spec = load_spec(config)?;
    info!(sweep = %spec.name, config = %config.display(), "Starting sweep");

    let report = Orchestrator::default().run_sweep(&spec).await;
    print_report(&report);
    if let Some(path) = report_path {
        write_report(&report, path)?;
    }
    Ok(())
}

fn cmd_plan(config: &Path) -> Result<()> {
    let spec = load_spec(config)?;

    for pipeline in plan(&spec) {
        println!("Sweep: {} ({} cases)", pipeline.sweep, pipeline.cases.len());
        for (point, case_dir) in &pipeline.cases {
            println!("  {:<10} {}", point, case_dir.display());
        }
        if pipeline.case_cost > 0 {
            for batch in &pipeline.batches {
                let dirs: Vec<String> = batch
                    .cases
                    .iter()
                    .filter_map(|i| pipeline.cases.get(*i))
                    .map(|(_, dir)| dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
                    .collect();
                println!("  batch {} ({} workers): {}", batch.index, batch.cost, dirs.join(", "));
            }
        }
        println!();
    }
    println!("Spec digest: {}", spec.digest());
    Ok(())
}

async fn cmd_post(config: &Path, report_path: Option<&Path>) -> Result<()> {
    let spec = load_spec(config)?;
    info!(sweep = %spec.name, config = %config.display(), "Starting post-processing");

    let report = Orchestrator::default().run_post(&spec).await;
    print_report(&report);
    if let Some(path) = report_path {
        write_report(&report, path)?;
    }
    Ok(())
}

fn cmd_latest(case: &Path) -> Result<()> {
    let snapshot = latest_snapshot(case).context("Failed to locate latest snapshot")?;
    println!("{}", snapshot.display());
    Ok(())
}

fn print_report(report: &SweepReport) {
    println!("Run ID: {}", report.run_id);
    println!(
        "Status: {}",
        if report.success() { "✓ ALL CASES DONE" } else { "✗ SOME CASES FAILED" }
    );
    println!("Duration: {}ms", report.duration_ms);

    for pipeline in &report.pipelines {
        println!();
        println!("Sweep: {}", pipeline.sweep);
        for case in &pipeline.cases {
            let status = if case.is_failed() { "✗" } else { "✓" };
            let mut line = format!("  {} {} [{}]", status, case.case_dir.display(), case.state.label());
            if !case.jobs.is_empty() {
                let pids: Vec<String> = case
                    .jobs
                    .iter()
                    .map(|j| j.pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()))
                    .collect();
                line.push_str(&format!(" detached pid {}", pids.join(",")));
            }
            if let Some(batch) = case.batch {
                line.push_str(&format!(" batch {}", batch));
            }
            println!("{}", line);
            for failure in &case.failures {
                println!("      - {}", failure);
            }
        }
    }

    println!();
    println!(
        "Summary: {}/{} cases done, {} failed",
        report.done_count(),
        report.cases().count(),
        report.failed_count()
    );
}

fn write_report(report: &SweepReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    println!("Report written to {}", path.display());
    Ok(())
}
