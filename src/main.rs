use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use off_extract::metrics::{init_metrics, write_snapshot};
use off_extract::{build_stage, logging, AppConfig, Pipeline, StageKind, StageReport};

#[derive(Parser)]
#[command(name = "off_extract")]
#[command(about = "Filtered CSV extracts of the Open Food Facts export")]
#[command(version)]
struct Cli {
    /// Config file (default: $OFF_EXTRACT_CONFIG, then ./off_extract.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print stage reports as JSON instead of summary lines
    #[arg(long, global = true)]
    json: bool,

    /// Write a Prometheus text snapshot of run metrics to this file
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    /// Directory for the rolling JSON log
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the raw export into the wide column extract
    Extract,
    /// Stream the raw export, keeping English-speaking countries only
    Countries,
    /// Keep rows with a usable environmental score or grade
    EnvValidity,
    /// Keep rows with a usable nutri-score or grade
    NutriValidity,
    /// Keep rows where both scores are numeric
    RequireScores,
    /// Drop columns no longer needed downstream
    DropColumns,
    /// Run the configured stage sequence
    RunAll,
}

impl Commands {
    fn stage(&self) -> Option<StageKind> {
        match self {
            Commands::Extract => Some(StageKind::Extract),
            Commands::Countries => Some(StageKind::Countries),
            Commands::EnvValidity => Some(StageKind::EnvValidity),
            Commands::NutriValidity => Some(StageKind::NutriValidity),
            Commands::RequireScores => Some(StageKind::RequireScores),
            Commands::DropColumns => Some(StageKind::DropColumns),
            Commands::RunAll => None,
        }
    }
}

fn print_report(report: &StageReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("✅ {}", report.summary());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.stage() {
        Some(kind) => {
            let stage = build_stage(&config, kind)?;
            info!(stage = %kind, source = %stage.source().display(), "Running stage");
            let report = stage
                .run()
                .with_context(|| format!("Stage '{}' failed", kind))?;
            print_report(&report, cli.json)?;
        }
        None => {
            let pipeline = Pipeline::from_config(&config)?;
            let result = pipeline.run()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for report in &result.stages {
                    print_report(report, false)?;
                }
                println!("🚀 Pipeline run {} finished", result.run_id);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir);

    if cli.metrics_out.is_some() {
        init_metrics();
    }

    let outcome = run(&cli);

    if let Some(path) = &cli.metrics_out {
        if let Err(e) = write_snapshot(path) {
            error!("Failed to write metrics snapshot: {}", e);
        }
    }

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}
