//! Probing a single identifier: fetch, classify, extract.

use std::time::Duration;

use chrono::Local;
use trialregistry_site::{detail_url, FetchError, PageFetcher};

use crate::classifier::{select_title, Classifier, HeuristicClassifier, Verdict, TITLE_SELECTORS};
use crate::fields::FieldExtractor;
use crate::identifier::Identifier;
use crate::institutions::InstitutionExtractor;
use crate::record::Record;
use crate::resolver::{DomainResolver, DEFAULT_READY_TIMEOUT};

/// Why a probe produced no record.
#[derive(Debug)]
pub enum Miss {
    /// The page could not be loaded.
    Fetch(FetchError),
    /// The page loaded but never rendered a body in time.
    NotReady,
    /// The page rendered but the classifier found no record behind it.
    Absent,
}

/// Result of probing one identifier.
#[derive(Debug)]
pub enum Probe {
    Hit(Record),
    Miss(Miss),
}

impl Probe {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Turns detail pages into [`Record`]s.
pub struct DetailScraper<C = HeuristicClassifier> {
    classifier: C,
    title_candidates: Vec<String>,
    fields: FieldExtractor,
    institutions: InstitutionExtractor,
    ready_timeout: Duration,
}

impl Default for DetailScraper<HeuristicClassifier> {
    fn default() -> Self {
        Self::new(HeuristicClassifier::default())
    }
}

impl<C: Classifier> DetailScraper<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            title_candidates: TITLE_SELECTORS.iter().map(|s| s.to_string()).collect(),
            fields: FieldExtractor::default(),
            institutions: InstitutionExtractor::default(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn with_fields(mut self, fields: FieldExtractor) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_institutions(mut self, institutions: InstitutionExtractor) -> Self {
        self.institutions = institutions;
        self
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    /// Loads the detail page for `identifier` from the resolver's pinned
    /// origin. A page that lands on another origin re-pins the resolver
    /// before anything is read from it.
    pub async fn probe<F: PageFetcher>(
        &self,
        fetcher: &mut F,
        resolver: &mut DomainResolver,
        identifier: Identifier,
    ) -> Probe {
        let url = match detail_url(resolver.pinned(), identifier.get()) {
            Ok(url) => url,
            Err(e) => return Probe::Miss(Miss::Fetch(e)),
        };
        if let Err(e) = fetcher.navigate(&url).await {
            tracing::debug!("{} failed to load: {}", identifier, e);
            return Probe::Miss(Miss::Fetch(e));
        }
        if let Some(landed) = fetcher.current_url() {
            resolver.repin(&landed);
        }
        if !fetcher.wait_for_ready(self.ready_timeout).await {
            tracing::debug!("{} body never became ready", identifier);
            return Probe::Miss(Miss::NotReady);
        }

        let (title, fields) = {
            let doc = match fetcher.snapshot() {
                Ok(doc) => doc,
                Err(e) => return Probe::Miss(Miss::Fetch(e)),
            };
            let candidates: Vec<&str> = self.title_candidates.iter().map(String::as_str).collect();
            let title = select_title(&doc, &candidates);
            if self.classifier.classify(&title) == Verdict::Absent {
                tracing::debug!("{} classified absent", identifier);
                return Probe::Miss(Miss::Absent);
            }
            let fields = self.fields.extract(&doc);
            (title, fields)
        };

        self.institutions.reveal(fetcher).await;
        let institutions = match fetcher.snapshot() {
            Ok(doc) => self.institutions.harvest(&doc),
            Err(e) => {
                tracing::debug!("{} institution panel unreadable: {}", identifier, e);
                Vec::new()
            }
        };

        let record = Record::new(identifier, title, Local::now().naive_local())
            .with_fields(fields)
            .with_institutions(institutions);
        Probe::Hit(record)
    }
}
