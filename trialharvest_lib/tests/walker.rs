mod common;

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use common::{instant, walker, FakeSite};
use trialharvest_lib::{
    CheckpointSink, Identifier, Interruption, Record, ScanEnd, StopSignal, StoreError, WalkPlan,
};
use trialharvest_lib::trialregistry_site::origin_of;

fn range(from: u64, to: u64) -> Vec<u64> {
    (from..=to).collect()
}

fn ids(records: &[Record]) -> Vec<u64> {
    records.iter().map(|r| r.identifier.get()).collect()
}

#[tokio::test]
async fn backfill_year_ends_after_threshold_misses() {
    let site = FakeSite::empty();
    let plan = instant(WalkPlan::backfill(vec![2020], BTreeSet::new()));

    let outcome = walker(&site).walk(&plan).await;

    assert!(outcome.records.is_empty());
    assert!(outcome.is_complete());
    assert_eq!(outcome.stats.fail, 10);
    assert_eq!(site.log.probed(), range(202000001, 202000010));

    let year = &outcome.years[0];
    assert_eq!(year.year, 2020);
    assert_eq!(year.ended, ScanEnd::MissThreshold);
    assert_eq!(year.first_probed, Some(Identifier::new(202000001)));
    assert_eq!(year.last_probed, Some(Identifier::new(202000010)));
    assert_eq!(site.log.launches(), 1);
}

#[tokio::test]
async fn incremental_collects_run_then_stops_after_twenty_misses() {
    let site = FakeSite::with_hits(range(202500051, 202500055));
    let plan = instant(WalkPlan::incremental(Identifier::new(202500050), None));

    let outcome = walker(&site).walk(&plan).await;

    assert_eq!(ids(&outcome.records), range(202500051, 202500055));
    assert_eq!(outcome.stats.success, 5);
    assert_eq!(outcome.stats.fail, 20);
    assert_eq!(outcome.max_identifier(), Some(Identifier::new(202500055)));
    assert_eq!(site.log.probed(), range(202500051, 202500075));
    // Recycled once, at the tenth consecutive miss.
    assert_eq!(site.log.launches(), 2);
}

#[tokio::test]
async fn captured_records_carry_fields_and_institutions() {
    let site = FakeSite::with_hits([202500051]);
    let plan = instant(WalkPlan::incremental(Identifier::new(202500050), Some(1)));

    let outcome = walker(&site).walk(&plan).await;

    let record = &outcome.records[0];
    assert_eq!(record.title, "[모집중] 합성 임상시험 202500051");
    assert_eq!(record.status, "모집중");
    assert_eq!(record.fields["임상시험 단계"], "2상");
    assert_eq!(record.institutions.len(), 1);
    assert_eq!(record.institutions[0].name, "합성병원 202500051");
    assert_eq!(record.institutions[0].contact.as_deref(), Some("담당자"));
}

#[tokio::test]
async fn backfill_skips_persisted_identifiers_unless_refreshed() {
    let hits = range(202000001, 202000003);
    let existing: HashSet<Identifier> =
        [202000001, 202000002].into_iter().map(Identifier::new).collect();

    let site = FakeSite::with_hits(hits.clone());
    let plan = instant(WalkPlan::backfill(vec![2020], BTreeSet::new()));
    let outcome = walker(&site)
        .with_existing(existing.clone())
        .walk(&plan)
        .await;
    assert_eq!(ids(&outcome.records), vec![202000003]);
    assert_eq!(outcome.stats.skip, 2);
    assert_eq!(site.log.probed()[0], 202000003);

    let site = FakeSite::with_hits(hits.clone());
    let plan = instant(WalkPlan::backfill(vec![2020], BTreeSet::from([2020])));
    let outcome = walker(&site).with_existing(existing).walk(&plan).await;
    assert_eq!(ids(&outcome.records), hits);
    assert_eq!(outcome.stats.skip, 0);
}

#[tokio::test]
async fn backfill_sweeps_years_in_order() {
    let site = FakeSite::with_hits([202100001, 201900001, 201900002]);
    let plan = instant(WalkPlan::backfill(vec![2021, 2019, 2021], BTreeSet::new()))
        .with_miss_threshold(3);

    let outcome = walker(&site).walk(&plan).await;

    assert_eq!(ids(&outcome.records), vec![201900001, 201900002, 202100001]);
    let years: Vec<u32> = outcome.years.iter().map(|y| y.year).collect();
    assert_eq!(years, vec![2019, 2021]);
    assert_eq!(outcome.years[0].hits, 2);
    assert_eq!(outcome.years[0].probes, 5);
}

#[tokio::test]
async fn success_limit_ends_the_walk() {
    let site = FakeSite::with_hits(range(202500051, 202500055));
    let plan = instant(WalkPlan::incremental(Identifier::new(202500050), Some(2)));

    let outcome = walker(&site).walk(&plan).await;

    assert_eq!(ids(&outcome.records), vec![202500051, 202500052]);
    assert_eq!(site.log.probed(), vec![202500051, 202500052]);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn periodic_restart_relaunches_the_fetcher() {
    let site = FakeSite::with_hits(range(202000001, 202000007));
    let mut plan = instant(WalkPlan::backfill(vec![2020], BTreeSet::new()));
    plan.maintenance.restart_every_processed = Some(3);

    let outcome = walker(&site).walk(&plan).await;

    // 7 hits + 10 misses = 17 probes: restarts after probes 3, 6, 9, 12, 15.
    assert_eq!(outcome.stats.probed(), 17);
    assert_eq!(site.log.launches(), 6);
}

#[tokio::test]
async fn stop_signal_returns_partial_outcome() {
    let site = FakeSite::with_hits(range(202500051, 202500060));
    let plan = instant(WalkPlan::incremental(Identifier::new(202500050), None));
    let signal = StopSignal::new();
    let trigger = signal.clone();

    let outcome = walker(&site)
        .with_stop_signal(signal)
        .with_observer(Box::new(move |stats, _| {
            if stats.success == 3 {
                trigger.raise();
            }
        }))
        .walk(&plan)
        .await;

    assert_eq!(ids(&outcome.records), range(202500051, 202500053));
    assert!(matches!(outcome.interruption, Some(Interruption::Signal)));
}

#[tokio::test]
async fn failed_relaunch_keeps_captured_records() {
    let site = FakeSite::with_hits([202500051, 202500052]).launch_budget(1);
    let plan = instant(WalkPlan::incremental(Identifier::new(202500050), None));

    let outcome = walker(&site).walk(&plan).await;

    // The recycle at the tenth miss cannot launch a new fetcher.
    assert_eq!(ids(&outcome.records), vec![202500051, 202500052]);
    assert!(matches!(outcome.interruption, Some(Interruption::Fetcher(_))));
    assert_eq!(outcome.stats.fail, 10);
}

#[tokio::test]
async fn launch_failure_interrupts_before_probing() {
    let site = FakeSite::empty().launch_budget(0);
    let plan = instant(WalkPlan::incremental(Identifier::new(202500050), None));

    let outcome = walker(&site).walk(&plan).await;

    assert!(outcome.records.is_empty());
    assert!(matches!(outcome.interruption, Some(Interruption::Fetcher(_))));
    assert!(site.log.probed().is_empty());
}

#[tokio::test]
async fn redirected_pages_repin_the_origin() {
    let site = FakeSite::with_hits([202500051]).moved_to("https://moved.test");
    let plan = instant(WalkPlan::incremental(Identifier::new(202500050), Some(1)));

    let mut walker = walker(&site);
    let outcome = walker.walk(&plan).await;

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(origin_of(walker.resolver().pinned()), "https://moved.test");
    // The first navigation is the resolver probe on the configured base;
    // detail pages are requested from the adopted origin.
    let hosts = site.log.hosts();
    assert_eq!(hosts[0], "registry.test");
    assert!(hosts[1..].iter().all(|h| h == "moved.test"));
}

#[tokio::test]
async fn explicit_policy_probes_each_listed_identifier_once() {
    let site = FakeSite::with_hits([202500053]);
    let listed = [202500053, 202500051, 202500053, 202400001]
        .into_iter()
        .map(Identifier::new)
        .collect();
    let existing = HashSet::from([Identifier::new(202400001)]);
    let plan = instant(WalkPlan::explicit(listed));

    let outcome = walker(&site).with_existing(existing).walk(&plan).await;

    assert_eq!(site.log.probed(), vec![202500051, 202500053]);
    assert_eq!(ids(&outcome.records), vec![202500053]);
    assert_eq!(outcome.stats.skip, 1);
}

#[derive(Clone, Default)]
struct RecordingSink(Arc<Mutex<Vec<(usize, usize)>>>);

impl CheckpointSink for RecordingSink {
    fn checkpoint(&self, records: &[Record], success_count: usize) -> Result<(), StoreError> {
        self.0.lock().unwrap().push((success_count, records.len()));
        Ok(())
    }
}

#[tokio::test]
async fn checkpoints_fire_every_n_successes() {
    let site = FakeSite::with_hits(range(202500051, 202500055));
    let plan = instant(WalkPlan::incremental(Identifier::new(202500050), None))
        .with_checkpoint_every(Some(2));
    let sink = RecordingSink::default();

    walker(&site)
        .with_checkpoint(Box::new(sink.clone()))
        .walk(&plan)
        .await;

    assert_eq!(*sink.0.lock().unwrap(), vec![(2, 2), (4, 4)]);
}
