//! Post-crawl cleaning for analysis exports.
//!
//! A cleaned record carries its title without the progress marker, the
//! trial period split into start and end months, and bare institution
//! names. Records that are layout leftovers rather than trials are dropped.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::classifier::HeuristicClassifier;
use crate::record::{strip_status_prefix, InstitutionEntry, Record};

pub const PERIOD_LABEL: &str = "임상시험 기간";
pub const START_MONTH_LABEL: &str = "임상시험 시작월";
pub const END_MONTH_LABEL: &str = "임상시험 종료월";

/// A record with none of these filled in is not a real trial.
pub const CORE_LABELS: &[&str] = &["임상시험 의뢰자", "임상시험 단계", "임상시험 승인일자"];

/// Records with this many non-empty values or fewer are dropped.
const MIN_FILLED_VALUES: usize = 3;

const DATE_SEPARATORS: &[char] = &['-', '.', '/'];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dummies_removed: usize,
    pub contacts_dropped: usize,
}

fn period_separator() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*(?:~|–|\s-\s)\s*").expect("period separator is valid"))
}

fn korean_year_month() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{4})\s*년\s*(\d{1,2})\s*월").expect("year-month pattern is valid")
    })
}

fn korean_year() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{4})\s*년").expect("year pattern is valid"))
}

fn hospital_name() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(.+?병원)").expect("hospital pattern is valid"))
}

fn clinic_name() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(.+?의원)").expect("clinic pattern is valid"))
}

fn year_month(year: i32, month: u32) -> Option<String> {
    (1..=12)
        .contains(&month)
        .then(|| format!("{:04}-{:02}", year, month))
}

/// `YYYY-MM-DD`, `YYYY-MM` and their `.` and `/` variants.
fn numeric_date(raw: &str) -> Option<String> {
    for sep in DATE_SEPARATORS {
        let parts: Vec<&str> = raw.split(*sep).collect();
        if parts.len() < 2 || parts.len() > 3 || parts[0].len() != 4 {
            continue;
        }
        let year: i32 = parts[0].parse().ok()?;
        let month: u32 = parts[1].parse().ok()?;
        if let Some(day) = parts.get(2) {
            let day: u32 = day.parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)?;
        }
        return year_month(year, month);
    }
    None
}

/// Normalizes one date-ish value to `YYYY-MM`, or `YYYY` when it names no
/// month. Days are dropped.
pub fn parse_month_or_year(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(ym) = numeric_date(s) {
        return Some(ym);
    }
    if let Some(caps) = korean_year_month().captures(s) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        return year_month(year, month);
    }
    if let Some(caps) = korean_year().captures(s) {
        return Some(caps[1].to_string());
    }

    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    if digits.len() >= 6 {
        let year = digits[..4].parse().ok()?;
        let month = digits[4..6].parse().ok()?;
        year_month(year, month)
    } else if digits.len() == 4 {
        Some(digits)
    } else {
        None
    }
}

/// Splits a trial period such as `2024-03-15 ~ 2026-12-31` into start and
/// end months. A single value has no end.
pub fn parse_period(raw: &str) -> (Option<String>, Option<String>) {
    let s = raw.trim();
    if s.is_empty() {
        return (None, None);
    }
    let mut parts = period_separator().split(s);
    let start = parts.next().and_then(parse_month_or_year);
    let end = parts.next().and_then(parse_month_or_year);
    (start, end)
}

/// Keeps the hospital (or clinic) part of an institution cell, dropping
/// department, title and address suffixes.
pub fn trim_institution_name(raw: &str) -> String {
    let t = raw.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == ' ');
    if t.is_empty() {
        return String::new();
    }
    if let Some(m) = hospital_name().find(t) {
        return m.as_str().trim().to_string();
    }
    if let Some(m) = clinic_name().find(t) {
        return m.as_str().trim().to_string();
    }
    t.split(',').next().unwrap_or(t).trim().to_string()
}

fn filled_values(record: &Record) -> usize {
    let scalars = [record.title.as_str(), record.status.as_str()]
        .iter()
        .filter(|v| !v.trim().is_empty())
        .count();
    let fields = record.fields.values().filter(|v| !v.trim().is_empty()).count();
    let institutions = record
        .institutions
        .iter()
        .filter(|i| !i.name.trim().is_empty())
        .count();
    1 + scalars + fields + institutions
}

/// Cleans every record and drops the ones that are not real trials.
#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    classifier: HeuristicClassifier,
}

impl Cleaner {
    /// Rewrites one record. The status tag is kept; only the title loses it.
    pub fn clean_record(&self, mut record: Record) -> Record {
        if let Some(period) = record.fields.get(PERIOD_LABEL).cloned() {
            let (start, end) = parse_period(&period);
            for (label, value) in [(START_MONTH_LABEL, start), (END_MONTH_LABEL, end)] {
                match value {
                    Some(v) => record.fields.insert(label.to_string(), v),
                    None => record.fields.remove(label),
                };
            }
        }
        record.title = strip_status_prefix(&record.title).to_string();
        record.institutions = record
            .institutions
            .into_iter()
            .map(|entry| InstitutionEntry {
                name: trim_institution_name(&entry.name),
                contact: None,
                extra: None,
            })
            .collect();
        record
    }

    /// A cleaned record is a dummy when its title is layout text, none of
    /// the core fields is filled, or it holds almost no values.
    pub fn is_dummy(&self, record: &Record) -> bool {
        if self.classifier.looks_garbage(&record.title) {
            return true;
        }
        let core_empty = CORE_LABELS
            .iter()
            .all(|label| record.fields.get(*label).map_or(true, |v| v.trim().is_empty()));
        core_empty || filled_values(record) <= MIN_FILLED_VALUES
    }

    pub fn clean(&self, records: Vec<Record>) -> (Vec<Record>, CleanReport) {
        let mut report = CleanReport {
            rows_in: records.len(),
            ..CleanReport::default()
        };
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            report.contacts_dropped += record
                .institutions
                .iter()
                .filter(|i| i.contact.is_some() || i.extra.is_some())
                .count();
            let cleaned = self.clean_record(record);
            if self.is_dummy(&cleaned) {
                tracing::debug!("Dropping dummy row {}", cleaned.identifier);
                report.dummies_removed += 1;
            } else {
                kept.push(cleaned);
            }
        }
        report.rows_out = kept.len();
        tracing::info!(
            "Cleaned {} rows: kept {}, dropped {} dummies",
            report.rows_in,
            report.rows_out,
            report.dummies_removed
        );
        (kept, report)
    }
}
