//! Identifier enumeration and the stop rules that bound it.
//!
//! The registry publishes no upper bound for any identifier range, so a
//! range is considered finished once enough consecutive identifiers in a row
//! turn out absent. One walker drives all three start policies; only where
//! it starts, what it skips, and when it stops differ.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::watch;
use trialregistry_site::{FetchError, FetcherFactory};

use crate::classifier::{Classifier, HeuristicClassifier};
use crate::detail::{DetailScraper, Miss, Probe};
use crate::identifier::Identifier;
use crate::record::Record;
use crate::resolver::DomainResolver;
use crate::session::FetcherSession;
use crate::store::StoreError;

pub const BACKFILL_MISS_THRESHOLD: usize = 10;
pub const INCREMENTAL_MISS_THRESHOLD: usize = 20;
pub const DEFAULT_CHECKPOINT_EVERY: usize = 100;

/// Where enumeration starts and which identifiers it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPolicy {
    /// Every identifier of each year, from `YYYY00001` upward. Identifiers
    /// already persisted are skipped unless their year is in
    /// `refresh_years`.
    YearSweep {
        years: Vec<u32>,
        refresh_years: BTreeSet<u32>,
    },
    /// Everything after `after`, with no upper bound.
    Resume { after: Identifier },
    /// Each listed identifier once, sorted and de-duplicated. No miss rule.
    Explicit(Vec<Identifier>),
}

impl StartPolicy {
    fn has_miss_rule(&self) -> bool {
        !matches!(self, Self::Explicit(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Consecutive misses that end a range.
    pub miss_threshold: usize,
    /// Successful captures after which the whole walk ends.
    pub success_limit: Option<usize>,
}

/// Fetcher teardown schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Maintenance {
    /// Relaunch whenever the consecutive-miss count reaches a multiple of this.
    pub recycle_every_misses: usize,
    pub recycle_pause: Duration,
    /// Relaunch after this many probes within one range.
    pub restart_every_processed: Option<usize>,
    pub restart_pause: Duration,
}

impl Maintenance {
    pub fn backfill() -> Self {
        Self {
            recycle_every_misses: 10,
            recycle_pause: Duration::from_secs(2),
            restart_every_processed: Some(500),
            restart_pause: Duration::from_secs(3),
        }
    }

    pub fn incremental() -> Self {
        Self {
            restart_every_processed: None,
            ..Self::backfill()
        }
    }

    /// Same schedule without the pauses.
    pub fn without_pauses(self) -> Self {
        Self {
            recycle_pause: Duration::ZERO,
            restart_pause: Duration::ZERO,
            ..self
        }
    }
}

/// Randomized delay between consecutive probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub const BACKFILL: Pacing = Pacing {
        min: Duration::from_millis(1500),
        max: Duration::from_millis(4000),
    };

    pub const INCREMENTAL: Pacing = Pacing {
        min: Duration::from_millis(350),
        max: Duration::from_millis(550),
    };

    pub const COLLECT: Pacing = Pacing {
        min: Duration::from_secs(2),
        max: Duration::from_secs(5),
    };

    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rand::thread_rng().gen_range(self.min.as_secs_f64()..self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Everything that shapes one walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkPlan {
    pub start: StartPolicy,
    pub stop: StopPolicy,
    pub maintenance: Maintenance,
    pub pacing: Pacing,
    /// Hand captured records to the checkpoint sink every this many
    /// successes.
    pub checkpoint_every: Option<usize>,
}

impl WalkPlan {
    pub fn backfill(years: Vec<u32>, refresh_years: BTreeSet<u32>) -> Self {
        Self {
            start: StartPolicy::YearSweep {
                years,
                refresh_years,
            },
            stop: StopPolicy {
                miss_threshold: BACKFILL_MISS_THRESHOLD,
                success_limit: None,
            },
            maintenance: Maintenance::backfill(),
            pacing: Pacing::BACKFILL,
            checkpoint_every: Some(DEFAULT_CHECKPOINT_EVERY),
        }
    }

    pub fn incremental(after: Identifier, limit: Option<usize>) -> Self {
        Self {
            start: StartPolicy::Resume { after },
            stop: StopPolicy {
                miss_threshold: INCREMENTAL_MISS_THRESHOLD,
                success_limit: limit,
            },
            maintenance: Maintenance::incremental(),
            pacing: Pacing::INCREMENTAL,
            checkpoint_every: Some(DEFAULT_CHECKPOINT_EVERY),
        }
    }

    pub fn explicit(identifiers: Vec<Identifier>) -> Self {
        Self {
            start: StartPolicy::Explicit(identifiers),
            stop: StopPolicy {
                miss_threshold: INCREMENTAL_MISS_THRESHOLD,
                success_limit: None,
            },
            maintenance: Maintenance::incremental(),
            pacing: Pacing::COLLECT,
            checkpoint_every: Some(DEFAULT_CHECKPOINT_EVERY),
        }
    }

    pub fn with_miss_threshold(mut self, miss_threshold: usize) -> Self {
        self.stop.miss_threshold = miss_threshold;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.stop.success_limit = limit;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_maintenance(mut self, maintenance: Maintenance) -> Self {
        self.maintenance = maintenance;
        self
    }

    pub fn with_checkpoint_every(mut self, every: Option<usize>) -> Self {
        self.checkpoint_every = every;
        self
    }
}

/// Receives the records captured so far at checkpoint intervals.
pub trait CheckpointSink {
    fn checkpoint(&self, records: &[Record], success_count: usize) -> Result<(), StoreError>;
}

/// Cooperative cancellation shared between the walker and whoever may
/// want to stop it (typically a Ctrl-C handler).
#[derive(Debug, Clone)]
pub struct StopSignal(Arc<watch::Sender<bool>>);

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(Arc::new(tx))
    }

    pub fn raise(&self) {
        self.0.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the signal is raised.
    pub async fn raised(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub success: usize,
    pub fail: usize,
    pub skip: usize,
}

impl CrawlStats {
    pub fn probed(&self) -> usize {
        self.success + self.fail
    }
}

/// Why a range stopped being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    Exhausted,
    MissThreshold,
    LimitReached,
    Interrupted,
}

/// Per-year summary of a year sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearReport {
    pub year: u32,
    pub first_probed: Option<Identifier>,
    pub last_probed: Option<Identifier>,
    pub probes: usize,
    pub hits: usize,
    pub ended: ScanEnd,
}

/// What cut a walk short.
#[derive(Debug)]
pub enum Interruption {
    /// The stop signal was raised.
    Signal,
    /// A page fetcher could not be (re)launched.
    Fetcher(FetchError),
}

/// Everything a walk produced. Always returned, so whatever was captured
/// before an interruption can still be persisted.
#[derive(Debug)]
pub struct WalkOutcome {
    pub records: Vec<Record>,
    pub stats: CrawlStats,
    pub years: Vec<YearReport>,
    pub interruption: Option<Interruption>,
    pub elapsed: Duration,
}

impl WalkOutcome {
    /// Highest identifier captured in this walk.
    pub fn max_identifier(&self) -> Option<Identifier> {
        self.records.iter().map(|r| r.identifier).max()
    }

    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }
}

/// Called after every probe with the running totals and the identifier
/// just probed.
pub type ProbeObserver = Box<dyn FnMut(&CrawlStats, Identifier) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipRule {
    Never,
    Existing,
}

#[derive(Default)]
struct Run {
    records: Vec<Record>,
    stats: CrawlStats,
    years: Vec<YearReport>,
    interruption: Option<Interruption>,
}

impl Run {
    fn interrupt(&mut self, cause: Interruption) {
        if self.interruption.is_none() {
            self.interruption = Some(cause);
        }
    }
}

#[derive(Default)]
struct Tally {
    first: Option<Identifier>,
    last: Option<Identifier>,
    probes: usize,
    hits: usize,
}

impl Tally {
    fn record(&mut self, id: Identifier, hit: bool) {
        self.first.get_or_insert(id);
        self.last = Some(id);
        self.probes += 1;
        if hit {
            self.hits += 1;
        }
    }

    fn into_report(self, year: u32, ended: ScanEnd) -> YearReport {
        YearReport {
            year,
            first_probed: self.first,
            last_probed: self.last,
            probes: self.probes,
            hits: self.hits,
            ended,
        }
    }
}

/// Drives one fetcher session across the identifiers a [`WalkPlan`] names.
pub struct RangeWalker<F: FetcherFactory, C = HeuristicClassifier> {
    session: FetcherSession<F>,
    resolver: DomainResolver,
    scraper: DetailScraper<C>,
    existing: HashSet<Identifier>,
    checkpoint: Option<Box<dyn CheckpointSink + Send>>,
    signal: StopSignal,
    observer: Option<ProbeObserver>,
}

impl<F: FetcherFactory, C: Classifier> RangeWalker<F, C> {
    pub fn new(factory: F, resolver: DomainResolver, scraper: DetailScraper<C>) -> Self {
        Self {
            session: FetcherSession::new(factory),
            resolver,
            scraper,
            existing: HashSet::new(),
            checkpoint: None,
            signal: StopSignal::new(),
            observer: None,
        }
    }

    /// Identifiers already persisted, consulted by the skip rule.
    pub fn with_existing(mut self, existing: HashSet<Identifier>) -> Self {
        self.existing = existing;
        self
    }

    pub fn with_checkpoint(mut self, sink: Box<dyn CheckpointSink + Send>) -> Self {
        self.checkpoint = Some(sink);
        self
    }

    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_observer(mut self, observer: ProbeObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn resolver(&self) -> &DomainResolver {
        &self.resolver
    }

    /// Fetchers launched so far, counting the initial one.
    pub fn launches(&self) -> usize {
        self.session.launches()
    }

    pub async fn walk(&mut self, plan: &WalkPlan) -> WalkOutcome {
        let started = Instant::now();
        let mut run = Run::default();

        match self.session.acquire().await {
            Ok(fetcher) => {
                self.resolver.resolve(fetcher).await;
            }
            Err(e) => {
                tracing::error!("Could not launch page fetcher: {}", e);
                run.interrupt(Interruption::Fetcher(e));
            }
        }

        if run.interruption.is_none() {
            match &plan.start {
                StartPolicy::YearSweep {
                    years,
                    refresh_years,
                } => {
                    let years: BTreeSet<u32> = years.iter().copied().collect();
                    for year in years {
                        let start = Identifier::year_start(year);
                        let end = Identifier::year_end_exclusive(year);
                        let skip = if refresh_years.contains(&year) {
                            SkipRule::Never
                        } else {
                            SkipRule::Existing
                        };
                        tracing::info!("Sweeping {} from {} (refresh: {})", year, start, skip == SkipRule::Never);
                        let ids = (start.get()..end.get()).map(Identifier::new);
                        let (ended, tally) = self.scan(plan, ids, skip, &mut run).await;
                        tracing::info!(
                            "Finished {} ({:?}): {} hits in {} probes | totals success {}, fail {}, skip {}",
                            year,
                            ended,
                            tally.hits,
                            tally.probes,
                            run.stats.success,
                            run.stats.fail,
                            run.stats.skip
                        );
                        run.years.push(tally.into_report(year, ended));
                        if matches!(ended, ScanEnd::Interrupted | ScanEnd::LimitReached) {
                            break;
                        }
                    }
                }
                StartPolicy::Resume { after } => {
                    tracing::info!("Scanning upward from {}", after.next());
                    let ids = (after.get() + 1..).map(Identifier::new);
                    let (ended, _) = self.scan(plan, ids, SkipRule::Never, &mut run).await;
                    tracing::info!("Incremental scan ended ({:?})", ended);
                }
                StartPolicy::Explicit(ids) => {
                    let ids: BTreeSet<Identifier> = ids.iter().copied().collect();
                    tracing::info!("Collecting {} listed identifiers", ids.len());
                    let (ended, _) = self.scan(plan, ids.into_iter(), SkipRule::Existing, &mut run).await;
                    tracing::info!("Collection ended ({:?})", ended);
                }
            }
        }

        self.session.release();
        let outcome = WalkOutcome {
            records: run.records,
            stats: run.stats,
            years: run.years,
            interruption: run.interruption,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Walk done in {:.1}s: success {}, fail {}, skip {}, launches {}",
            outcome.elapsed.as_secs_f64(),
            outcome.stats.success,
            outcome.stats.fail,
            outcome.stats.skip,
            self.session.launches()
        );
        outcome
    }

    async fn scan<I>(&mut self, plan: &WalkPlan, ids: I, skip: SkipRule, run: &mut Run) -> (ScanEnd, Tally)
    where
        I: Iterator<Item = Identifier>,
    {
        let mut tally = Tally::default();
        let mut consecutive_misses = 0usize;
        let mut processed = 0usize;

        for id in ids {
            if self.signal.is_raised() {
                run.interrupt(Interruption::Signal);
                return (ScanEnd::Interrupted, tally);
            }
            if plan
                .stop
                .success_limit
                .is_some_and(|limit| run.stats.success >= limit)
            {
                return (ScanEnd::LimitReached, tally);
            }
            if skip == SkipRule::Existing && self.existing.contains(&id) {
                run.stats.skip += 1;
                if run.stats.skip % 200 == 0 {
                    tracing::debug!("Skipped {} known identifiers (latest {})", run.stats.skip, id);
                }
                continue;
            }

            if tally.probes > 0 {
                self.pause(plan.pacing.delay()).await;
                if self.signal.is_raised() {
                    run.interrupt(Interruption::Signal);
                    return (ScanEnd::Interrupted, tally);
                }
            }

            let fetcher = match self.session.acquire().await {
                Ok(fetcher) => fetcher,
                Err(e) => {
                    tracing::error!("Page fetcher unavailable at {}: {}", id, e);
                    run.interrupt(Interruption::Fetcher(e));
                    return (ScanEnd::Interrupted, tally);
                }
            };
            let probe = self.scraper.probe(fetcher, &mut self.resolver, id).await;
            tally.record(id, probe.is_hit());
            processed += 1;

            match probe {
                Probe::Hit(record) => {
                    consecutive_misses = 0;
                    run.stats.success += 1;
                    tracing::debug!("{} captured: {}", id, preview(&record.title));
                    run.records.push(record);
                    self.maybe_checkpoint(plan, run);
                }
                Probe::Miss(miss) => {
                    consecutive_misses += 1;
                    run.stats.fail += 1;
                    if let Miss::Fetch(e) = &miss {
                        tracing::debug!("{} miss {} in a row: {}", id, consecutive_misses, e);
                    } else {
                        tracing::debug!("{} miss {} in a row: {:?}", id, consecutive_misses, miss);
                    }

                    if plan.start.has_miss_rule() && consecutive_misses >= plan.stop.miss_threshold {
                        self.notify(&run.stats, id);
                        tracing::info!(
                            "Range ends after {} consecutive misses (last probed {})",
                            consecutive_misses,
                            id
                        );
                        return (ScanEnd::MissThreshold, tally);
                    }

                    let every = plan.maintenance.recycle_every_misses;
                    if every > 0 && consecutive_misses % every == 0 {
                        tracing::info!("Recycling page fetcher after {} consecutive misses", consecutive_misses);
                        if let Err(e) = self.relaunch(plan.maintenance.recycle_pause).await {
                            run.interrupt(Interruption::Fetcher(e));
                            return (ScanEnd::Interrupted, tally);
                        }
                    }
                }
            }
            self.notify(&run.stats, id);

            if let Some(every) = plan.maintenance.restart_every_processed {
                if every > 0 && processed % every == 0 {
                    tracing::info!("Restarting page fetcher after {} probes", processed);
                    if let Err(e) = self.relaunch(plan.maintenance.restart_pause).await {
                        run.interrupt(Interruption::Fetcher(e));
                        return (ScanEnd::Interrupted, tally);
                    }
                }
            }
        }

        (ScanEnd::Exhausted, tally)
    }

    /// Tears the fetcher down, relaunches it, and resolves the registry
    /// origin again.
    async fn relaunch(&mut self, pause: Duration) -> Result<(), FetchError> {
        let fetcher = self.session.recycle(pause).await.map_err(|e| {
            tracing::error!("Page fetcher relaunch failed: {}", e);
            e
        })?;
        self.resolver.resolve(fetcher).await;
        Ok(())
    }

    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.signal.raised() => {}
        }
    }

    fn maybe_checkpoint(&self, plan: &WalkPlan, run: &Run) {
        let (Some(every), Some(sink)) = (plan.checkpoint_every, self.checkpoint.as_ref()) else {
            return;
        };
        if every == 0 || run.stats.success % every != 0 {
            return;
        }
        match sink.checkpoint(&run.records, run.stats.success) {
            Ok(()) => tracing::info!("Checkpointed {} records", run.records.len()),
            Err(e) => tracing::warn!("Checkpoint at {} successes failed: {}", run.stats.success, e),
        }
    }

    fn notify(&mut self, stats: &CrawlStats, id: Identifier) {
        if let Some(observer) = self.observer.as_mut() {
            observer(stats, id);
        }
    }
}

fn preview(title: &str) -> String {
    title.chars().take(50).collect()
}
