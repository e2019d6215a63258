//! CLI subcommand implementations.

pub mod backfill;
pub mod clean;
pub mod collect;
pub mod gaps;
pub mod incremental;
pub mod merge;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use trialharvest_lib::store::write_records;
use trialharvest_lib::walker::ProbeObserver;
use trialharvest_lib::{
    CsvBackups, DetailScraper, HarvestConfig, HttpFetcherFactory, Interruption, RangeWalker,
    Record, StopSignal, WalkOutcome,
};

/// A walker wired to the HTTP fetcher, CSV checkpoints, and Ctrl-C.
pub fn build_walker(config: &HarvestConfig, headed: bool) -> Result<RangeWalker<HttpFetcherFactory>> {
    if headed {
        tracing::debug!("--headed has no effect on the HTTP fetcher");
    }
    let scraper = DetailScraper::default()
        .with_institutions(config.institution_extractor())
        .with_ready_timeout(config.ready_timeout());
    Ok(
        RangeWalker::new(config.fetcher_factory(!headed), config.resolver()?, scraper)
            .with_checkpoint(Box::new(CsvBackups::new(&config.store.backup_dir)))
            .with_stop_signal(stop_on_ctrl_c()),
    )
}

/// Raises the returned signal on the first Ctrl-C.
fn stop_on_ctrl_c() -> StopSignal {
    let signal = StopSignal::new();
    let raise = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing the current probe and saving progress");
            raise.raise();
        }
    });
    signal
}

/// Spinner showing running counters, plus the observer that feeds it.
pub fn progress(label: &str) -> (ProgressBar, ProbeObserver) {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {prefix}: {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));

    let bar = pb.clone();
    let observer: ProbeObserver = Box::new(move |stats, id| {
        bar.set_message(format!(
            "{} | success {} fail {} skip {}",
            id, stats.success, stats.fail, stats.skip
        ));
    });
    (pb, observer)
}

pub fn summarize(outcome: &WalkOutcome) {
    eprintln!(
        "Walk finished in {:.1}s: success {}, fail {}, skip {}",
        outcome.elapsed.as_secs_f64(),
        outcome.stats.success,
        outcome.stats.fail,
        outcome.stats.skip
    );
}

/// Turns a walk's interruption into the command result, after whatever it
/// captured has been persisted.
pub fn conclude(interruption: Option<Interruption>) -> Result<()> {
    match interruption {
        None => Ok(()),
        Some(Interruption::Signal) => {
            eprintln!("Stopped early; captured records were saved.");
            Ok(())
        }
        Some(Interruption::Fetcher(e)) => Err(anyhow!("page fetcher failed: {}", e)),
    }
}

/// Last-resort dump of records the store refused, so a failed write never
/// loses a session's captures.
pub fn rescue(config: &HarvestConfig, records: &[Record], cause: anyhow::Error) -> anyhow::Error {
    let path: PathBuf = config.store.output_dir.join(format!(
        "unsaved_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    match write_records(&path, records) {
        Ok(()) => cause.context(format!(
            "store write failed; {} records saved to {}",
            records.len(),
            path.display()
        )),
        Err(e) => cause.context(format!("store write failed and rescue write to {} failed: {}", path.display(), e)),
    }
}
