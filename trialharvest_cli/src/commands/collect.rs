//! The `collect` subcommand: probe listed identifiers or dataset gaps.

use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use clap::Args;
use trialharvest_lib::gaps::missing_identifiers;
use trialharvest_lib::validation::{self, MAX_IDENTIFIER_COUNT};
use trialharvest_lib::{
    open_store, reconcile, year_summaries, HarvestConfig, HarvestError, Identifier, Precedence,
};

use crate::commands::{build_walker, conclude, progress, rescue, summarize};
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CollectArgs {
    /// Comma-separated identifiers to probe
    #[arg(long, conflicts_with = "years")]
    pub ids: Option<String>,

    /// Probe the gaps of these years in the stored dataset (default: every year)
    #[arg(long)]
    pub years: Option<String>,

    /// Request an interactive page fetcher
    #[arg(long)]
    pub headed: bool,
}

pub async fn run(args: &CollectArgs, config: &HarvestConfig, format: &OutputFormat) -> Result<()> {
    let mut store = open_store(&config.store)?;
    let existing = store.load_all()?;
    let known: HashSet<Identifier> = existing.iter().map(|r| r.identifier).collect();

    let targets = match &args.ids {
        Some(raw) => validation::parse_identifiers(raw)?,
        None => {
            let years: BTreeSet<u32> = match &args.years {
                Some(raw) => validation::parse_years(raw)?.into_iter().collect(),
                None => BTreeSet::new(),
            };
            let gaps = missing_identifiers(&year_summaries(known.iter().copied()), &years);
            if gaps.len() > MAX_IDENTIFIER_COUNT {
                return Err(HarvestError::InvalidInput(format!(
                    "{} missing identifiers exceed the limit of {}; narrow --years",
                    gaps.len(),
                    MAX_IDENTIFIER_COUNT
                ))
                .into());
            }
            gaps
        }
    };
    if targets.is_empty() {
        println!("nothing to collect");
        return Ok(());
    }
    eprintln!("Collecting {} identifiers into {}", targets.len(), store.location());

    let plan = config.collect_plan(targets);
    let (pb, observer) = progress("collect");
    let mut walker = build_walker(config, args.headed)?
        .with_existing(known)
        .with_observer(observer);
    let mut outcome = walker.walk(&plan).await;
    pb.finish_and_clear();
    summarize(&outcome);

    let fresh = std::mem::take(&mut outcome.records);
    if fresh.is_empty() {
        println!("nothing collected");
        return conclude(outcome.interruption.take());
    }

    let reconciled = reconcile(fresh.clone(), existing, Precedence::ExistingWins);
    let appended = store
        .append(&reconciled.kept_fresh)
        .map_err(|e| rescue(config, &fresh, e.into()))?;
    eprintln!("Appended {} records to {}", appended, store.location());

    output::print_records(&fresh, format);
    conclude(outcome.interruption.take())
}
