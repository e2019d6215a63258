//! The `gaps` subcommand: holes in the stored identifier sequence.

use anyhow::Result;
use clap::Args;
use trialharvest_lib::gaps::largest_first;
use trialharvest_lib::{open_store, validation, year_summaries, HarvestConfig};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct GapsArgs {
    /// Only report this year
    #[arg(long)]
    pub year: Option<u32>,

    /// Number of largest gaps to list
    #[arg(long, default_value = "20")]
    pub top: usize,
}

pub fn run(args: &GapsArgs, config: &HarvestConfig, format: &OutputFormat) -> Result<()> {
    let year = args.year.map(validation::validate_year).transpose()?;
    let store = open_store(&config.store)?;
    let identifiers = store.existing_identifiers()?;

    let mut summaries = year_summaries(identifiers);
    if let Some(year) = year {
        summaries.retain(|s| s.year == year);
    }
    if summaries.is_empty() {
        println!("no records in {}", store.location());
        return Ok(());
    }

    match format {
        OutputFormat::Json => output::print_json(&summaries),
        OutputFormat::Table => {
            output::print_year_summaries(&summaries);
            let gaps = largest_first(summaries.iter().flat_map(|s| s.gaps.iter().copied()).collect());
            if !gaps.is_empty() {
                output::print_gaps(&gaps[..gaps.len().min(args.top)]);
            }
        }
    }
    Ok(())
}
