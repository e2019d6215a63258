//! Flat row layout shared by every tabular export.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::clean::{END_MONTH_LABEL, PERIOD_LABEL, START_MONTH_LABEL};
use crate::fields::TITLE_LABEL;
use crate::identifier::Identifier;
use crate::institutions::INSTITUTION_LABEL;
use crate::record::{status_from_title, FieldMap, InstitutionEntry, Record};

use super::StoreError;

pub const IDENTIFIER_COLUMN: &str = "clncTestSn";
pub const STATUS_COLUMN: &str = "진행상태";
pub const CAPTURED_AT_COLUMN: &str = "크롤링일시";
pub const CAPTURED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CONTACT_SUFFIX: &str = "_담당자";
const EXTRA_SUFFIX: &str = "_기타";

/// Columns always written, in this order, even when empty.
pub const BASE_COLUMNS: &[&str] = &[
    IDENTIFIER_COLUMN,
    STATUS_COLUMN,
    CAPTURED_AT_COLUMN,
    TITLE_LABEL,
    "임상시험 의뢰자",
    "소재지",
    "대상질환",
    "대상질환명",
    "임상시험 단계",
    "임상시험 기간",
    "성별",
    "나이",
    "목표 대상자 수(국내)",
    "임상시험 승인일자",
    "최근 변경일자",
    "이용문의",
];

fn institution_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"^{}(\d+)(_담당자|_기타)?$", INSTITUTION_LABEL))
            .expect("institution column pattern is valid")
    })
}

/// `(index, slot)` for an institution column, slot 0 = name, 1 = contact,
/// 2 = extra.
fn institution_slot(column: &str) -> Option<(usize, u8)> {
    let caps = institution_pattern().captures(column)?;
    let index = caps.get(1)?.as_str().parse().ok()?;
    let slot = match caps.get(2).map(|m| m.as_str()) {
        None => 0,
        Some(CONTACT_SUFFIX) => 1,
        Some(_) => 2,
    };
    Some((index, slot))
}

fn institution_column(index: usize, slot: u8) -> String {
    match slot {
        0 => format!("{}{}", INSTITUTION_LABEL, index),
        1 => format!("{}{}{}", INSTITUTION_LABEL, index, CONTACT_SUFFIX),
        _ => format!("{}{}{}", INSTITUTION_LABEL, index, EXTRA_SUFFIX),
    }
}

/// Flattens a record into column → value. Empty values are omitted.
pub fn record_to_row(record: &Record) -> BTreeMap<String, String> {
    let mut row: BTreeMap<String, String> = record
        .fields
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for (i, entry) in record.institutions.iter().enumerate() {
        let index = i + 1;
        row.insert(institution_column(index, 0), entry.name.clone());
        if let Some(contact) = entry.contact.as_ref().filter(|c| !c.is_empty()) {
            row.insert(institution_column(index, 1), contact.clone());
        }
        if let Some(extra) = entry.extra.as_ref().filter(|e| !e.is_empty()) {
            row.insert(institution_column(index, 2), extra.clone());
        }
    }

    row.insert(IDENTIFIER_COLUMN.to_string(), record.identifier.to_string());
    row.insert(STATUS_COLUMN.to_string(), record.status.clone());
    row.insert(
        CAPTURED_AT_COLUMN.to_string(),
        record.captured_at.format(CAPTURED_AT_FORMAT).to_string(),
    );
    row.insert(TITLE_LABEL.to_string(), record.title.clone());
    row.retain(|_, v| !v.is_empty());
    row
}

/// Header for a set of rows: the base columns, then institution columns by
/// index (name, contact, extra), then every other column sorted.
pub fn column_order<'a>(rows: impl IntoIterator<Item = &'a BTreeMap<String, String>>) -> Vec<String> {
    let mut institutions = Vec::new();
    let mut remaining = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    for row in rows {
        for column in row.keys() {
            if BASE_COLUMNS.contains(&column.as_str()) || !seen.insert(column.clone()) {
                continue;
            }
            match institution_slot(column) {
                Some(slot) => institutions.push((slot, column.clone())),
                None => remaining.push(column.clone()),
            }
        }
    }
    institutions.sort();
    remaining.sort();

    BASE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(institutions.into_iter().map(|(_, c)| c))
        .chain(remaining)
        .collect()
}

/// Header for cleaned exports: no capture time, and the start and end
/// months right after the trial period.
pub fn clean_column_order<'a>(rows: impl IntoIterator<Item = &'a BTreeMap<String, String>>) -> Vec<String> {
    let mut header: Vec<String> = column_order(rows)
        .into_iter()
        .filter(|c| !matches!(c.as_str(), CAPTURED_AT_COLUMN | START_MONTH_LABEL | END_MONTH_LABEL))
        .collect();
    let at = header
        .iter()
        .position(|c| c == PERIOD_LABEL)
        .map_or(header.len(), |i| i + 1);
    header.insert(at, START_MONTH_LABEL.to_string());
    header.insert(at + 1, END_MONTH_LABEL.to_string());
    header
}

/// Rebuilds a record from a row. `line` is only used in error messages.
pub fn row_to_record(row: &BTreeMap<String, String>, line: usize) -> Result<Record, StoreError> {
    let invalid = |reason: String| StoreError::InvalidRow { row: line, reason };

    let raw_id = row
        .get(IDENTIFIER_COLUMN)
        .ok_or_else(|| invalid(format!("missing {}", IDENTIFIER_COLUMN)))?;
    let identifier: Identifier = raw_id
        .parse()
        .map_err(|e| invalid(format!("{} {:?}: {}", IDENTIFIER_COLUMN, raw_id, e)))?;

    let title = row.get(TITLE_LABEL).cloned().unwrap_or_default();
    let captured_at = row
        .get(CAPTURED_AT_COLUMN)
        .and_then(|raw| parse_captured_at(raw))
        .unwrap_or_default();
    let status = row
        .get(STATUS_COLUMN)
        .filter(|s| !s.is_empty())
        .cloned()
        .or_else(|| status_from_title(&title).map(str::to_string))
        .unwrap_or_default();

    let mut fields = FieldMap::new();
    let mut slots: BTreeMap<usize, [Option<String>; 3]> = BTreeMap::new();
    for (column, value) in row {
        if value.is_empty()
            || matches!(
                column.as_str(),
                IDENTIFIER_COLUMN | STATUS_COLUMN | CAPTURED_AT_COLUMN | TITLE_LABEL
            )
        {
            continue;
        }
        match institution_slot(column) {
            Some((index, slot)) => {
                slots.entry(index).or_default()[slot as usize] = Some(value.clone());
            }
            None => {
                fields.insert(column.clone(), value.clone());
            }
        }
    }

    let institutions = slots
        .into_values()
        .filter_map(|[name, contact, extra]| {
            Some(InstitutionEntry {
                name: name?,
                contact,
                extra,
            })
        })
        .collect();

    Ok(Record {
        identifier,
        title,
        status,
        captured_at,
        fields,
        institutions,
    })
}

fn parse_captured_at(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, CAPTURED_AT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
