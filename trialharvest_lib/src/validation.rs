//! Input validation for command-line values and loaded configuration.

use std::collections::BTreeSet;

use trialregistry_site::Url;

use crate::config::{ConfigError, HarvestConfig};
use crate::error::HarvestError;
use crate::identifier::Identifier;

pub const MIN_YEAR: u32 = 2000;
pub const MAX_YEAR: u32 = 2100;
/// Upper bound on identifiers accepted by `parse_identifiers`.
pub const MAX_IDENTIFIER_COUNT: usize = 10_000;
/// Longest pacing delay or pause the walker will sleep for.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Validate a registration year.
pub fn validate_year(year: u32) -> Result<u32, HarvestError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(HarvestError::InvalidInput(format!(
            "year {} is outside {}..={}",
            year, MIN_YEAR, MAX_YEAR
        )));
    }
    Ok(year)
}

/// Parse a year list: `2019-2024`, `2019,2021`, or a mix such as
/// `2019,2021-2023`. Returns sorted, de-duplicated years.
pub fn parse_years(input: &str) -> Result<Vec<u32>, HarvestError> {
    let mut years = BTreeSet::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((from, to)) => {
                let from = parse_year(from)?;
                let to = parse_year(to)?;
                if from > to {
                    return Err(HarvestError::InvalidInput(format!(
                        "year range {} runs backwards",
                        part
                    )));
                }
                years.extend(from..=to);
            }
            None => {
                years.insert(parse_year(part)?);
            }
        }
    }
    if years.is_empty() {
        return Err(HarvestError::InvalidInput("no years given".to_string()));
    }
    Ok(years.into_iter().collect())
}

fn parse_year(raw: &str) -> Result<u32, HarvestError> {
    let year = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| HarvestError::InvalidInput(format!("invalid year '{}'", raw.trim())))?;
    validate_year(year)
}

/// Parse a comma- or whitespace-separated identifier list.
pub fn parse_identifiers(input: &str) -> Result<Vec<Identifier>, HarvestError> {
    let ids = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(validate_identifier)
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err(HarvestError::InvalidInput("no identifiers given".to_string()));
    }
    if ids.len() > MAX_IDENTIFIER_COUNT {
        return Err(HarvestError::InvalidInput(format!(
            "at most {} identifiers per run",
            MAX_IDENTIFIER_COUNT
        )));
    }
    Ok(ids)
}

/// Validate one identifier: digits only, with a plausible year prefix.
pub fn validate_identifier(raw: &str) -> Result<Identifier, HarvestError> {
    let id: Identifier = raw
        .parse()
        .map_err(|_| HarvestError::InvalidInput(format!("invalid identifier '{}'", raw.trim())))?;
    validate_year(id.year()).map_err(|_| {
        HarvestError::InvalidInput(format!("identifier {} has no valid year prefix", id))
    })?;
    Ok(id)
}

/// Validate a consecutive-miss threshold or similar positive count.
pub fn validate_threshold(threshold: usize) -> Result<usize, HarvestError> {
    if threshold == 0 {
        return Err(HarvestError::InvalidInput(
            "threshold must be at least 1".to_string(),
        ));
    }
    Ok(threshold)
}

/// Validate a success limit. Zero is rejected; omit the limit instead.
pub fn validate_limit(limit: usize) -> Result<usize, HarvestError> {
    if limit == 0 {
        return Err(HarvestError::InvalidInput("limit must be at least 1".to_string()));
    }
    Ok(limit)
}

/// Checks a loaded configuration for values the walker cannot run with.
pub fn validate_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::Invalid(msg));

    if config.site.candidate_bases.is_empty() {
        return invalid("site.candidate_bases must name at least one base".to_string());
    }
    for base in &config.site.candidate_bases {
        match Url::parse(base) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
            _ => return invalid(format!("site.candidate_bases: {:?} is not an http(s) URL", base)),
        }
    }
    if config.site.ready_timeout_secs == 0 || config.site.request_timeout_secs == 0 {
        return invalid("site timeouts must be at least 1 second".to_string());
    }

    let walk = &config.walk;
    for (name, value) in [
        ("walk.backfill_miss_threshold", walk.backfill_miss_threshold),
        ("walk.incremental_miss_threshold", walk.incremental_miss_threshold),
        ("walk.max_institutions", walk.max_institutions),
    ] {
        if value == 0 {
            return invalid(format!("{} must be at least 1", name));
        }
    }
    if walk.checkpoint_every == Some(0) || walk.restart_every_processed == Some(0) {
        return invalid("walk cadences must be at least 1 (use null to disable)".to_string());
    }
    for (name, pacing) in [
        ("walk.backfill_pacing", walk.backfill_pacing),
        ("walk.incremental_pacing", walk.incremental_pacing),
        ("walk.collect_pacing", walk.collect_pacing),
    ] {
        if !delay_in_range(pacing.min_secs)
            || !delay_in_range(pacing.max_secs)
            || pacing.min_secs > pacing.max_secs
        {
            return invalid(format!(
                "{}: need 0 <= min_secs <= max_secs <= {}",
                name, MAX_DELAY_SECS
            ));
        }
    }
    for (name, value) in [
        ("walk.recycle_pause_secs", walk.recycle_pause_secs),
        ("walk.restart_pause_secs", walk.restart_pause_secs),
    ] {
        if !delay_in_range(value) {
            return invalid(format!("{} must be within 0..={}", name, MAX_DELAY_SECS));
        }
    }

    for year in config
        .backfill
        .years
        .iter()
        .chain(config.backfill.refresh_years.iter())
    {
        if validate_year(*year).is_err() {
            return invalid(format!(
                "backfill year {} is outside {}..={}",
                year, MIN_YEAR, MAX_YEAR
            ));
        }
    }
    Ok(())
}

fn delay_in_range(secs: f64) -> bool {
    (0.0..=MAX_DELAY_SECS).contains(&secs)
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
