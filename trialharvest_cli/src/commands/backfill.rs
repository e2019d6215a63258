//! The `backfill` subcommand: sweep whole years and rewrite the dataset.

use std::collections::HashSet;

use anyhow::Result;
use clap::Args;
use trialharvest_lib::{open_store, reconcile, validation, HarvestConfig, Identifier, Precedence};

use crate::commands::{build_walker, conclude, progress, rescue, summarize};
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct BackfillArgs {
    /// Years to sweep, e.g. 2019-2024 or 2019,2021 (default: backfill.years)
    #[arg(long)]
    pub years: Option<String>,

    /// Years whose already stored records are probed again
    #[arg(long)]
    pub refresh: Option<String>,

    /// Consecutive misses that end a year
    #[arg(long)]
    pub threshold: Option<usize>,

    /// Request an interactive page fetcher
    #[arg(long)]
    pub headed: bool,
}

pub async fn run(args: &BackfillArgs, config: &HarvestConfig, format: &OutputFormat) -> Result<()> {
    let years = match &args.years {
        Some(raw) => validation::parse_years(raw)?,
        None => config.backfill.years.clone(),
    };
    let refresh = match &args.refresh {
        Some(raw) => validation::parse_years(raw)?,
        None => config.backfill.refresh_years.clone(),
    };
    let mut plan = config.backfill_plan(years.clone(), refresh);
    if let Some(threshold) = args.threshold {
        plan = plan.with_miss_threshold(validation::validate_threshold(threshold)?);
    }

    let mut store = open_store(&config.store)?;
    let existing = store.load_all()?;
    let known: HashSet<Identifier> = existing.iter().map(|r| r.identifier).collect();
    eprintln!(
        "Starting backfill of {:?} into {} ({} records held)",
        years,
        store.location(),
        existing.len()
    );

    let (pb, observer) = progress("backfill");
    let mut walker = build_walker(config, args.headed)?
        .with_existing(known)
        .with_observer(observer);
    let mut outcome = walker.walk(&plan).await;
    pb.finish_and_clear();
    summarize(&outcome);

    let fresh = std::mem::take(&mut outcome.records);
    if fresh.is_empty() {
        println!("nothing collected");
    } else {
        let reconciled = reconcile(fresh.clone(), existing, Precedence::FreshWins);
        let written = store
            .replace_all(&reconciled.merged)
            .map_err(|e| rescue(config, &fresh, e.into()))?;
        if let Some(backup) = written {
            eprintln!("Previous dataset backed up to {}", backup.display());
        }
        if let Some(max) = reconciled.max_identifier() {
            store.set_watermark(max)?;
        }
        eprintln!(
            "Dataset now holds {} records ({} new, {} refreshed)",
            reconciled.merged.len(),
            reconciled.added,
            reconciled.replaced
        );
    }

    output::print_year_reports(&outcome.years, format);
    conclude(outcome.interruption.take())
}
