//! Selection of the registry origin currently serving detail pages.
//!
//! The registry has moved between hosts and silently redirects from old
//! ones, so the crawl pins whichever origin actually answers and re-pins
//! whenever a page lands somewhere else.

use std::time::Duration;

use trialregistry_site::{detail_url, origin_of, PageFetcher, Url};

use crate::identifier::Identifier;

/// Known registry hosts, current first.
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "https://trialforme.konect.or.kr",
    "https://www.koreaclinicaltrials.org",
];

/// A record known to exist, used to test candidates.
pub const DEFAULT_PROBE: Identifier = Identifier::new(202_499_968);

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(8);

/// How the last [`DomainResolver::resolve`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A candidate rendered the probe page; holds the adopted origin.
    Resolved(Url),
    /// No candidate answered; the first candidate is kept.
    Degraded(Url),
}

#[derive(Debug, Clone)]
pub struct DomainResolver {
    candidates: Vec<Url>,
    probe: Identifier,
    ready_timeout: Duration,
    pinned: Url,
}

impl DomainResolver {
    /// Returns `None` when `candidates` is empty.
    pub fn new(candidates: Vec<Url>, probe: Identifier, ready_timeout: Duration) -> Option<Self> {
        let pinned = candidates.first()?.clone();
        Some(Self {
            candidates,
            probe,
            ready_timeout,
            pinned,
        })
    }

    /// The origin detail URLs are currently built from.
    pub fn pinned(&self) -> &Url {
        &self.pinned
    }

    /// Tries each candidate in order and adopts the post-redirect origin of
    /// the first one whose probe page becomes ready. Never fails: with no
    /// live candidate the first one is pinned and every later probe will
    /// simply classify as absent.
    pub async fn resolve<F: PageFetcher>(&mut self, fetcher: &mut F) -> Resolution {
        for candidate in &self.candidates {
            let url = match detail_url(candidate, self.probe.get()) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Skipping candidate {}: {}", candidate, e);
                    continue;
                }
            };
            if let Err(e) = fetcher.navigate(&url).await {
                tracing::debug!("Candidate {} did not answer: {}", origin_of(candidate), e);
                continue;
            }
            if !fetcher.wait_for_ready(self.ready_timeout).await {
                tracing::debug!("Candidate {} never became ready", origin_of(candidate));
                continue;
            }
            let landed = fetcher.current_url().unwrap_or_else(|| candidate.clone());
            self.pin(&landed);
            tracing::info!("Using registry at {}", origin_of(&self.pinned));
            return Resolution::Resolved(self.pinned.clone());
        }

        self.pinned = self.candidates[0].clone();
        tracing::warn!(
            "No candidate registry answered; falling back to {}",
            origin_of(&self.pinned)
        );
        Resolution::Degraded(self.pinned.clone())
    }

    /// Re-pins to the origin of `observed` when it differs from the pinned
    /// one. Returns whether the pin moved.
    pub fn repin(&mut self, observed: &Url) -> bool {
        if origin_of(observed) == origin_of(&self.pinned) {
            return false;
        }
        let before = origin_of(&self.pinned);
        self.pin(observed);
        tracing::info!("Registry moved from {} to {}", before, origin_of(&self.pinned));
        true
    }

    fn pin(&mut self, landed: &Url) {
        let mut origin = landed.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);
        self.pinned = origin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> DomainResolver {
        let candidates = DEFAULT_CANDIDATES
            .iter()
            .map(|c| Url::parse(c).unwrap())
            .collect();
        DomainResolver::new(candidates, DEFAULT_PROBE, DEFAULT_READY_TIMEOUT).unwrap()
    }

    #[test]
    fn empty_candidates_are_rejected() {
        assert!(DomainResolver::new(Vec::new(), DEFAULT_PROBE, DEFAULT_READY_TIMEOUT).is_none());
    }

    #[test]
    fn starts_pinned_to_first_candidate() {
        assert_eq!(origin_of(resolver().pinned()), "https://trialforme.konect.or.kr");
    }

    #[test]
    fn repin_ignores_same_origin() {
        let mut r = resolver();
        let same = Url::parse("https://trialforme.konect.or.kr/clnctest/view.do?clncTestSn=1").unwrap();
        assert!(!r.repin(&same));
    }

    #[test]
    fn repin_adopts_new_origin_without_path() {
        let mut r = resolver();
        let moved = Url::parse("https://new.example.org:8443/clnctest/view.do?clncTestSn=1").unwrap();
        assert!(r.repin(&moved));
        assert_eq!(r.pinned().as_str(), "https://new.example.org:8443/");
    }
}
