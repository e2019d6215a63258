//! Harvest settings loaded from YAML.
//!
//! Every section has defaults, so an empty file (or no file) yields a
//! working configuration. `TRIALHARVEST_BASE_URL` and
//! `TRIALHARVEST_DATASET` override the file after loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trialregistry_site::{HttpFetcherFactory, Url};

use crate::identifier::Identifier;
use crate::institutions::{InstitutionExtractor, DEFAULT_MAX_ENTRIES};
use crate::resolver::{DomainResolver, DEFAULT_CANDIDATES, DEFAULT_PROBE};
use crate::validation::MAX_DELAY_SECS;
use crate::walker::{
    Maintenance, Pacing, WalkPlan, BACKFILL_MISS_THRESHOLD, DEFAULT_CHECKPOINT_EVERY,
    INCREMENTAL_MISS_THRESHOLD,
};

pub const BASE_URL_ENV: &str = "TRIALHARVEST_BASE_URL";
pub const DATASET_ENV: &str = "TRIALHARVEST_DATASET";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config YAML: {0}")]
    YamlParse(#[from] serde_yml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub site: SiteConfig,
    pub walk: WalkConfig,
    pub backfill: BackfillConfig,
    pub incremental: IncrementalConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Registry origins to try, in order.
    pub candidate_bases: Vec<String>,
    /// An identifier known to exist, used to test candidates.
    pub probe_identifier: u64,
    pub ready_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            candidate_bases: DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            probe_identifier: DEFAULT_PROBE.get(),
            ready_timeout_secs: 8,
            request_timeout_secs: 30,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacingConfig {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl PacingConfig {
    pub fn to_pacing(self) -> Pacing {
        Pacing {
            min: delay(self.min_secs),
            max: delay(self.max_secs),
        }
    }
}

/// Seconds to a duration, capped at `MAX_DELAY_SECS`. Negative values
/// become zero.
fn delay(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.min(MAX_DELAY_SECS)).unwrap_or(Duration::ZERO)
}

impl From<Pacing> for PacingConfig {
    fn from(p: Pacing) -> Self {
        Self {
            min_secs: p.min.as_secs_f64(),
            max_secs: p.max.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    pub backfill_miss_threshold: usize,
    pub incremental_miss_threshold: usize,
    pub recycle_every_misses: usize,
    pub recycle_pause_secs: f64,
    /// Backfill only; `null` disables the periodic restart.
    pub restart_every_processed: Option<usize>,
    pub restart_pause_secs: f64,
    pub backfill_pacing: PacingConfig,
    pub incremental_pacing: PacingConfig,
    pub collect_pacing: PacingConfig,
    /// `null` disables checkpoints.
    pub checkpoint_every: Option<usize>,
    pub max_institutions: usize,
}

impl Default for WalkConfig {
    fn default() -> Self {
        let maintenance = Maintenance::backfill();
        Self {
            backfill_miss_threshold: BACKFILL_MISS_THRESHOLD,
            incremental_miss_threshold: INCREMENTAL_MISS_THRESHOLD,
            recycle_every_misses: maintenance.recycle_every_misses,
            recycle_pause_secs: maintenance.recycle_pause.as_secs_f64(),
            restart_every_processed: maintenance.restart_every_processed,
            restart_pause_secs: maintenance.restart_pause.as_secs_f64(),
            backfill_pacing: Pacing::BACKFILL.into(),
            incremental_pacing: Pacing::INCREMENTAL.into(),
            collect_pacing: Pacing::COLLECT.into(),
            checkpoint_every: Some(DEFAULT_CHECKPOINT_EVERY),
            max_institutions: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl WalkConfig {
    fn maintenance(&self, restart: bool) -> Maintenance {
        Maintenance {
            recycle_every_misses: self.recycle_every_misses,
            recycle_pause: delay(self.recycle_pause_secs),
            restart_every_processed: if restart {
                self.restart_every_processed
            } else {
                None
            },
            restart_pause: delay(self.restart_pause_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    pub years: Vec<u32>,
    /// Years collected again even when already persisted.
    pub refresh_years: Vec<u32>,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            years: (2019..=2025).collect(),
            refresh_years: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalConfig {
    /// Identifiers below the watermark re-probed on each run.
    pub resume_buffer: u64,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self { resume_buffer: 10 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Csv,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub dataset: PathBuf,
    /// CSV store only; SQLite keeps the watermark in the database.
    pub watermark: PathBuf,
    pub backup_dir: PathBuf,
    /// Where incremental snapshots are written.
    pub output_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Csv,
            dataset: PathBuf::from("clinical_trials_full.csv"),
            watermark: PathBuf::from("last_clnc_test_sn.txt"),
            backup_dir: PathBuf::from("backups"),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl HarvestConfig {
    /// Parses YAML; an empty document gives the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Loads `path` (defaults when it does not exist), applies environment
    /// overrides, and validates the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })?;
            Self::from_yaml(&yaml)?
        } else {
            tracing::debug!("{} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        crate::validation::validate_config(&config)?;
        Ok(config)
    }

    /// Applies `TRIALHARVEST_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.site.candidate_bases = vec![base.trim().to_string()];
        }
        if let Some(dataset) = lookup(DATASET_ENV).filter(|v| !v.trim().is_empty()) {
            self.store.dataset = PathBuf::from(dataset.trim());
        }
    }

    pub fn candidate_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.site
            .candidate_bases
            .iter()
            .map(|base| {
                Url::parse(base)
                    .map_err(|e| ConfigError::Invalid(format!("candidate base {:?}: {}", base, e)))
            })
            .collect()
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.site.ready_timeout_secs)
    }

    pub fn resolver(&self) -> Result<DomainResolver, ConfigError> {
        DomainResolver::new(
            self.candidate_urls()?,
            Identifier::new(self.site.probe_identifier),
            self.ready_timeout(),
        )
        .ok_or_else(|| ConfigError::Invalid("no candidate bases configured".to_string()))
    }

    /// Fetcher factory honouring the request timeout, user agent, and the
    /// headless toggle.
    pub fn fetcher_factory(&self, headless: bool) -> HttpFetcherFactory {
        let factory = HttpFetcherFactory::new(Duration::from_secs(self.site.request_timeout_secs))
            .headless(headless);
        match &self.site.user_agent {
            Some(ua) => factory.with_user_agent(ua.clone()),
            None => factory,
        }
    }

    pub fn institution_extractor(&self) -> InstitutionExtractor {
        InstitutionExtractor::default().with_max_entries(self.walk.max_institutions)
    }

    pub fn backfill_plan(&self, years: Vec<u32>, refresh_years: Vec<u32>) -> WalkPlan {
        WalkPlan::backfill(years, refresh_years.into_iter().collect())
            .with_miss_threshold(self.walk.backfill_miss_threshold)
            .with_maintenance(self.walk.maintenance(true))
            .with_pacing(self.walk.backfill_pacing.to_pacing())
            .with_checkpoint_every(self.walk.checkpoint_every)
    }

    pub fn incremental_plan(&self, after: Identifier, limit: Option<usize>) -> WalkPlan {
        WalkPlan::incremental(after, limit)
            .with_miss_threshold(self.walk.incremental_miss_threshold)
            .with_maintenance(self.walk.maintenance(false))
            .with_pacing(self.walk.incremental_pacing.to_pacing())
            .with_checkpoint_every(self.walk.checkpoint_every)
    }

    pub fn collect_plan(&self, identifiers: Vec<Identifier>) -> WalkPlan {
        WalkPlan::explicit(identifiers)
            .with_maintenance(self.walk.maintenance(false))
            .with_pacing(self.walk.collect_pacing.to_pacing())
            .with_checkpoint_every(self.walk.checkpoint_every)
    }

    /// Incremental start point derived from a persisted watermark.
    pub fn resume_after(&self, watermark: Identifier) -> Identifier {
        watermark.saturating_sub(self.incremental.resume_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = HarvestConfig::from_yaml("").unwrap();
        assert_eq!(config, HarvestConfig::default());
        assert_eq!(config.walk.backfill_miss_threshold, 10);
        assert_eq!(config.walk.incremental_miss_threshold, 20);
        assert_eq!(config.incremental.resume_buffer, 10);
        assert_eq!(config.store.kind, StoreKind::Csv);
    }

    #[test]
    fn shipped_settings_match_defaults() {
        let yaml = include_str!("../../config/settings.yaml");
        assert_eq!(HarvestConfig::from_yaml(yaml).unwrap(), HarvestConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
walk:
  incremental_miss_threshold: 5
store:
  kind: sqlite
  dataset: data/trials.sqlite
"#;
        let config = HarvestConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.walk.incremental_miss_threshold, 5);
        assert_eq!(config.walk.backfill_miss_threshold, 10);
        assert_eq!(config.store.kind, StoreKind::Sqlite);
        assert_eq!(config.store.dataset, PathBuf::from("data/trials.sqlite"));
        assert_eq!(config.store.backup_dir, PathBuf::from("backups"));
    }

    #[test]
    fn unknown_store_kind_is_rejected() {
        assert!(HarvestConfig::from_yaml("store:\n  kind: parquet\n").is_err());
    }

    #[test]
    fn env_overrides_replace_bases_and_dataset() {
        let mut config = HarvestConfig::default();
        config.apply_overrides(|key| match key {
            BASE_URL_ENV => Some("http://127.0.0.1:9000".to_string()),
            DATASET_ENV => Some("other.csv".to_string()),
            _ => None,
        });
        assert_eq!(config.site.candidate_bases, vec!["http://127.0.0.1:9000"]);
        assert_eq!(config.store.dataset, PathBuf::from("other.csv"));
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let mut config = HarvestConfig::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config, HarvestConfig::default());
    }

    #[test]
    fn resume_point_backs_off_by_buffer() {
        let config = HarvestConfig::default();
        assert_eq!(
            config.resume_after(Identifier::new(202500100)),
            Identifier::new(202500090)
        );
        assert_eq!(config.resume_after(Identifier::new(3)), Identifier::new(0));
    }

    #[test]
    fn plans_follow_walk_settings() {
        let mut config = HarvestConfig::default();
        config.walk.restart_every_processed = Some(50);
        config.walk.checkpoint_every = None;

        let backfill = config.backfill_plan(vec![2020], vec![2020]);
        assert_eq!(backfill.maintenance.restart_every_processed, Some(50));
        assert_eq!(backfill.checkpoint_every, None);

        let incremental = config.incremental_plan(Identifier::new(1), None);
        assert_eq!(incremental.maintenance.restart_every_processed, None);
        assert_eq!(incremental.stop.miss_threshold, 20);
    }

    #[test]
    fn out_of_range_delays_do_not_panic() {
        let mut config = HarvestConfig::from_yaml(
            "walk:\n  backfill_pacing:\n    min_secs: -1.0\n    max_secs: .inf\n",
        )
        .unwrap();
        config.walk.restart_pause_secs = f64::NAN;
        let plan = config.backfill_plan(vec![2020], vec![]);
        assert_eq!(plan.pacing.min, Duration::ZERO);
        assert_eq!(plan.pacing.max, Duration::from_secs(3600));
        assert_eq!(plan.maintenance.restart_pause, Duration::from_secs(3600));
    }
}
