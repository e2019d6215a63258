//! A synthetic registry for driving the walker without a network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trialharvest_lib::trialregistry_site::{Document, FetchError, Url, IDENTIFIER_PARAM};
use trialharvest_lib::{
    DetailScraper, DomainResolver, FetcherFactory, Identifier, Maintenance, PageFetcher, Pacing,
    RangeWalker, WalkPlan,
};

pub const PROBE: u64 = 202_499_968;
pub const BASE: &str = "https://registry.test";

const ABSENT_HTML: &str = r#"<html><body>
<div class="recruit-group2"><div class="box">임상시험 정보 식약처 승인 목록 목록으로</div></div>
</body></html>"#;

fn real_html(id: u64) -> String {
    format!(
        r#"<html><body>
<div class="recruit-group2"><div class="box">[모집중] 합성 임상시험 {id}</div></div>
<div class="recruit-detail">
  <div class="txt-group"><span class="tit">임상시험 단계</span><span class="txt">2상</span></div>
</div>
<ul class="tab"><li><a href='#tab2'>실시기관</a></li></ul>
<div id="tab2"><table><tbody><tr><td>합성병원 {id}</td><td>담당자</td></tr></tbody></table></div>
</body></html>"#
    )
}

/// Shared view of what the fake site saw.
#[derive(Clone, Default)]
pub struct SiteLog {
    navigations: Arc<Mutex<Vec<Url>>>,
    launches: Arc<AtomicUsize>,
}

impl SiteLog {
    /// Identifiers requested, excluding domain-resolution probes.
    pub fn probed(&self) -> Vec<u64> {
        self.navigations
            .lock()
            .unwrap()
            .iter()
            .filter_map(identifier_of)
            .filter(|id| *id != PROBE)
            .collect()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.navigations
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| u.host_str().map(str::to_string))
            .collect()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

fn identifier_of(url: &Url) -> Option<u64> {
    url.query_pairs()
        .find(|(k, _)| k == IDENTIFIER_PARAM)
        .and_then(|(_, v)| v.parse().ok())
}

/// Serves a real page for each identifier in `hits` (plus the resolver
/// probe) and a layout dump for everything else.
#[derive(Clone)]
pub struct FakeSite {
    hits: Arc<Vec<u64>>,
    moved_to: Option<Url>,
    launch_budget: Option<usize>,
    pub log: SiteLog,
}

impl FakeSite {
    pub fn with_hits(hits: impl IntoIterator<Item = u64>) -> Self {
        Self {
            hits: Arc::new(hits.into_iter().collect()),
            moved_to: None,
            launch_budget: None,
            log: SiteLog::default(),
        }
    }

    pub fn empty() -> Self {
        Self::with_hits([])
    }

    /// Every page lands on `origin` as if redirected.
    pub fn moved_to(mut self, origin: &str) -> Self {
        self.moved_to = Some(Url::parse(origin).unwrap());
        self
    }

    /// Launches beyond `budget` fail.
    pub fn launch_budget(mut self, budget: usize) -> Self {
        self.launch_budget = Some(budget);
        self
    }
}

pub struct FakeFetcher {
    hits: Arc<Vec<u64>>,
    moved_to: Option<Url>,
    log: SiteLog,
    current: Option<(Url, String)>,
}

impl FetcherFactory for FakeSite {
    type Fetcher = FakeFetcher;

    async fn launch(&self) -> Result<FakeFetcher, FetchError> {
        let launched = self.log.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.launch_budget.is_some_and(|budget| launched > budget) {
            return Err(FetchError::Launch("launch budget exhausted".into()));
        }
        Ok(FakeFetcher {
            hits: Arc::clone(&self.hits),
            moved_to: self.moved_to.clone(),
            log: self.log.clone(),
            current: None,
        })
    }
}

impl PageFetcher for FakeFetcher {
    async fn navigate(&mut self, url: &Url) -> Result<(), FetchError> {
        self.log.navigations.lock().unwrap().push(url.clone());
        let id = identifier_of(url).unwrap_or_default();
        let html = if id == PROBE || self.hits.contains(&id) {
            real_html(id)
        } else {
            ABSENT_HTML.to_string()
        };
        let mut landed = url.clone();
        if let Some(origin) = &self.moved_to {
            landed.set_host(origin.host_str()).unwrap();
        }
        self.current = Some((landed, html));
        Ok(())
    }

    async fn wait_for_ready(&mut self, _timeout: Duration) -> bool {
        self.current.is_some()
    }

    fn current_url(&self) -> Option<Url> {
        self.current.as_ref().map(|(url, _)| url.clone())
    }

    fn snapshot(&self) -> Result<Document, FetchError> {
        self.current
            .as_ref()
            .map(|(_, html)| Document::parse(html))
            .ok_or(FetchError::NoPage)
    }

    async fn activate(&mut self, label: &str) -> Result<bool, FetchError> {
        Ok(self
            .current
            .as_ref()
            .is_some_and(|(_, html)| html.contains(label)))
    }

    fn force_visible(&mut self, _selector: &str) -> bool {
        false
    }
}

pub fn resolver() -> DomainResolver {
    DomainResolver::new(
        vec![Url::parse(BASE).unwrap()],
        Identifier::new(PROBE),
        Duration::from_secs(1),
    )
    .unwrap()
}

pub fn walker(site: &FakeSite) -> RangeWalker<FakeSite> {
    RangeWalker::new(site.clone(), resolver(), DetailScraper::default())
}

/// Strips every delay from a plan.
pub fn instant(plan: WalkPlan) -> WalkPlan {
    let maintenance = plan.maintenance.without_pauses();
    plan.with_pacing(Pacing::none()).with_maintenance(maintenance)
}

pub fn backfill_maintenance() -> Maintenance {
    Maintenance::backfill().without_pauses()
}
