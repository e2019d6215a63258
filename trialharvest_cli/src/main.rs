mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use trialharvest_lib::HarvestConfig;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "trialharvest")]
#[command(about = "Discover and extract clinical trial records from the registry")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config/settings.yaml", global = true)]
    config: PathBuf,

    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// Log every probe
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep whole years of identifiers and rewrite the dataset
    Backfill(commands::backfill::BackfillArgs),
    /// Scan upward from the stored watermark and append new records
    Incremental(commands::incremental::IncrementalArgs),
    /// Probe listed identifiers, or the gaps in the dataset
    Collect(commands::collect::CollectArgs),
    /// Report holes in the persisted identifier sequence
    Gaps(commands::gaps::GapsArgs),
    /// Merge several dataset CSV files into one
    Merge(commands::merge::MergeArgs),
    /// Write an analysis-ready copy of a dataset CSV
    Clean(commands::clean::CleanArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("trialharvest={}", level).parse()?)
                .add_directive(format!("trialregistry_site={}", level).parse()?),
        )
        .with_target(false)
        .init();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    let config = HarvestConfig::load(&cli.config)?;

    match &cli.command {
        Commands::Backfill(args) => commands::backfill::run(args, &config, &format).await?,
        Commands::Incremental(args) => commands::incremental::run(args, &config, &format).await?,
        Commands::Collect(args) => commands::collect::run(args, &config, &format).await?,
        Commands::Gaps(args) => commands::gaps::run(args, &config, &format)?,
        Commands::Merge(args) => commands::merge::run(args)?,
        Commands::Clean(args) => commands::clean::run(args, &config, &format)?,
    }

    Ok(())
}
