//! Library layer for trialharvest: discovery and extraction of clinical
//! trial records from the registry's detail pages.
//!
//! Wraps the `trialregistry_site` crate with the crawl engine: existence
//! classification, field and institution extraction, identifier range
//! walking, reconciliation against a persisted dataset, and the stores that
//! hold that dataset.

pub mod classifier;
pub mod clean;
pub mod config;
pub mod detail;
pub mod error;
pub mod fields;
pub mod gaps;
pub mod identifier;
pub mod institutions;
pub mod reconcile;
pub mod record;
pub mod resolver;
pub mod session;
pub mod store;
pub mod validation;
pub mod walker;

pub use trialregistry_site;
pub use trialregistry_site::{FetchError, FetcherFactory, HttpFetcherFactory, PageFetcher};

pub use classifier::{Classifier, HeuristicClassifier, Verdict};
pub use clean::{CleanReport, Cleaner};
pub use config::{ConfigError, HarvestConfig, StoreConfig, StoreKind};
pub use detail::{DetailScraper, Miss, Probe};
pub use error::HarvestError;
pub use gaps::{find_gaps, year_summaries, Gap, YearSummary};
pub use identifier::Identifier;
pub use institutions::InstitutionExtractor;
pub use reconcile::{merge_datasets, reconcile, Precedence, Reconciled};
pub use record::{InstitutionEntry, Record};
pub use resolver::{DomainResolver, Resolution};
pub use session::FetcherSession;
pub use store::{open_store, CsvBackups, CsvStore, DatasetStore, SqliteStore, StoreError};
pub use walker::{
    CheckpointSink, CrawlStats, Interruption, Maintenance, Pacing, RangeWalker, ScanEnd,
    StartPolicy, StopPolicy, StopSignal, WalkOutcome, WalkPlan, YearReport,
};
