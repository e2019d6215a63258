//! The `incremental` subcommand: scan upward from the watermark and append.

use anyhow::Result;
use chrono::Local;
use clap::Args;
use trialharvest_lib::store::write_increment;
use trialharvest_lib::{
    open_store, reconcile, validation, HarvestConfig, HarvestError, Identifier, Precedence,
};

use crate::commands::clean::clean_increment;
use crate::commands::{build_walker, conclude, progress, rescue, summarize};
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct IncrementalArgs {
    /// Resume after this identifier instead of the stored watermark
    #[arg(long = "since-sn")]
    pub since_sn: Option<String>,

    /// Stop after this many captured records
    #[arg(long)]
    pub limit: Option<usize>,

    /// Consecutive misses that end the scan
    #[arg(long)]
    pub threshold: Option<usize>,

    /// Request an interactive page fetcher
    #[arg(long)]
    pub headed: bool,
}

pub async fn run(args: &IncrementalArgs, config: &HarvestConfig, format: &OutputFormat) -> Result<()> {
    let mut store = open_store(&config.store)?;
    let watermark = store.watermark()?;

    let after = match (&args.since_sn, watermark) {
        (Some(raw), _) => validation::validate_identifier(raw)?,
        (None, Some(watermark)) => {
            let after = config.resume_after(watermark);
            eprintln!(
                "Resuming after {} (watermark {} minus buffer {})",
                after, watermark, config.incremental.resume_buffer
            );
            after
        }
        (None, None) => {
            return Err(HarvestError::InvalidInput(format!(
                "no watermark found for {}; run a backfill first or pass --since-sn",
                store.location()
            ))
            .into())
        }
    };
    let limit = args.limit.map(validation::validate_limit).transpose()?;
    let mut plan = config.incremental_plan(after, limit);
    if let Some(threshold) = args.threshold {
        plan = plan.with_miss_threshold(validation::validate_threshold(threshold)?);
    }

    let (pb, observer) = progress("incremental");
    let mut walker = build_walker(config, args.headed)?.with_observer(observer);
    let mut outcome = walker.walk(&plan).await;
    pb.finish_and_clear();
    summarize(&outcome);

    let fresh = std::mem::take(&mut outcome.records);
    if fresh.is_empty() {
        println!("nothing collected");
        return conclude(outcome.interruption.take());
    }

    let existing = store.load_all().map_err(|e| rescue(config, &fresh, e.into()))?;
    let reconciled = reconcile(fresh.clone(), existing, Precedence::ExistingWins);
    let appended = store
        .append(&reconciled.kept_fresh)
        .map_err(|e| rescue(config, &fresh, e.into()))?;
    if let Some(next) = advanced_watermark(watermark, reconciled.max_identifier()) {
        store.set_watermark(next)?;
    }
    eprintln!(
        "Appended {} new records to {} ({} already held)",
        appended,
        store.location(),
        fresh.len() - reconciled.added
    );

    output::print_records(&fresh, format);
    let increment = write_increment(&config.store.output_dir, &fresh, Local::now().naive_local())?;
    if let Err(e) = clean_increment(&increment) {
        tracing::warn!("Could not write a cleaned snapshot of {}: {:#}", increment.display(), e);
    }
    println!("{}", increment.display());
    conclude(outcome.interruption.take())
}

/// The watermark only moves forward; a `--since-sn` below it never rewinds it.
fn advanced_watermark(current: Option<Identifier>, captured: Option<Identifier>) -> Option<Identifier> {
    match (current, captured) {
        (_, None) => None,
        (Some(current), Some(max)) if max <= current => None,
        (_, Some(max)) => Some(max),
    }
}
