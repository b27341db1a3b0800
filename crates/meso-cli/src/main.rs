//! # Meso CLI
//!
//! Command-line interface for the spike analysis of mesocircuit simulations.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use meso_core::AnalysisParams;
use meso_io::{FirstGlanceRow, Workflow};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "meso")]
#[command(author = "Yatrogenesis")]
#[command(version = "0.1.0")]
#[command(about = "Spike analysis of spatially resolved network simulations", long_about = None)]
struct Cli {
    /// Analysis parameters (TOML); defaults to $MESO_CONFIG_PATH or ./meso_analysis.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert raw records and compute the preprocessed datasets
    Preprocess,

    /// Compute statistics from preprocessed datasets
    Statistics,

    /// Merge per-population artifacts into one file per datatype
    Merge,

    /// Preprocess, compute statistics and merge
    Run,

    /// Print the effective parameters
    ShowConfig,
}

/// Log targets raised by `--debug`
const LOG_TARGETS: [&str; 5] = ["meso", "meso_core", "meso_preprocess", "meso_stats", "meso_io"];

fn init_logging(debug: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if debug { "debug" } else { "warn" };
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect();
        tracing_subscriber::EnvFilter::new(directives.join(","))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Run one phase behind a spinner.
fn phase<T>(message: &str, f: impl FnOnce() -> meso_core::Result<T>) -> anyhow::Result<T> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed_precise}]")
            .context("progress template")?,
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));

    tracing::info!(phase = message, "starting");
    match f() {
        Ok(value) => {
            let elapsed_ms = pb.elapsed().as_millis() as u64;
            tracing::info!(phase = message, elapsed_ms, "finished");
            pb.finish_with_message(format!("{} {}", message, "done".green()));
            Ok(value)
        }
        Err(e) => {
            tracing::error!(phase = message, error = %e, "failed");
            pb.abandon_with_message(format!("{} {}", message, "failed".red()));
            Err(e).with_context(|| format!("{message} failed"))
        }
    }
}

fn print_first_glance(rows: &[FirstGlanceRow]) {
    println!();
    println!("{}", "First glance at the data:".green().bold());
    println!(
        "  {:<12} {:>12} {:>12}",
        "population".cyan(),
        "num_neurons".cyan(),
        "rate_s-1".cyan()
    );
    for row in rows {
        println!(
            "  {:<12} {:>12} {:>12.3}",
            row.population, row.num_neurons, row.rate
        );
    }
    println!();
}

fn preprocess(workflow: &Workflow) -> anyhow::Result<()> {
    let conversions = phase("Converting raw node ids", || workflow.convert_raw())?;
    let analysed = if workflow.params().extract_disc {
        phase("Extracting central disc", || workflow.extract_disc())?
    } else {
        workflow.params().populations()
    };
    workflow.store().write_populations(&analysed)?;
    print_first_glance(&meso_io::first_glance(workflow.params(), &conversions));
    phase("Preprocessing", || workflow.preprocess_populations(&analysed))
}

fn statistics(workflow: &Workflow) -> anyhow::Result<()> {
    phase("Computing statistics", || workflow.compute_statistics())
}

fn merge(workflow: &Workflow) -> anyhow::Result<()> {
    let merged = phase("Merging artifacts", || workflow.merge())?;
    for path in merged {
        println!("  {}", path.display());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if cli.no_color {
        colored::control::set_override(false);
    }

    let params = AnalysisParams::load(cli.config.as_deref()).context("loading parameters")?;
    tracing::debug!(
        populations = params.populations.len(),
        workers = params.workers,
        "parameters loaded"
    );

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", "Analysis parameters:".green().bold());
            println!("{}", toml::to_string_pretty(&params)?);
            return Ok(());
        }
        Commands::Preprocess => preprocess(&Workflow::new(params)?)?,
        Commands::Statistics => statistics(&Workflow::new(params)?)?,
        Commands::Merge => merge(&Workflow::new(params)?)?,
        Commands::Run => {
            let workflow = Workflow::new(params)?;
            preprocess(&workflow)?;
            statistics(&workflow)?;
            merge(&workflow)?;
        }
    }

    println!("{}", "Analysis finished".green().bold());
    Ok(())
}
