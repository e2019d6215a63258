//! Extracted registry records.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// Dynamically discovered field labels mapped to their values.
pub type FieldMap = BTreeMap<String, String>;

/// One facility row from the institution panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionEntry {
    pub name: String,
    pub contact: Option<String>,
    /// Remaining non-empty columns joined with `" | "`.
    pub extra: Option<String>,
}

/// A single registry entry captured from its detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: Identifier,
    pub title: String,
    /// Registry progress state (`모집중`, `종료`, ...), empty when the title
    /// carries none.
    #[serde(default)]
    pub status: String,
    pub captured_at: NaiveDateTime,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub institutions: Vec<InstitutionEntry>,
}

impl Record {
    /// A record holding only its title. The status tag is derived from the
    /// title prefix.
    pub fn new(identifier: Identifier, title: impl Into<String>, captured_at: NaiveDateTime) -> Self {
        let title = title.into();
        let status = status_from_title(&title).unwrap_or_default().to_string();
        Self {
            identifier,
            title,
            status,
            captured_at,
            fields: FieldMap::new(),
            institutions: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_institutions(mut self, institutions: Vec<InstitutionEntry>) -> Self {
        self.institutions = institutions;
        self
    }

    pub fn year(&self) -> u32 {
        self.identifier.year()
    }
}

fn status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*[\[\(【]?\s*(승인완료|모집중|모집완료|종료)\s*[\]\)】]?\s*[-–:·•]?\s*")
            .expect("status pattern is valid")
    })
}

/// Extracts a leading progress marker such as `[모집중]` or `종료 -` from a
/// title.
pub fn status_from_title(title: &str) -> Option<&str> {
    status_pattern()
        .captures(title)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The title with any leading progress marker removed.
pub fn strip_status_prefix(title: &str) -> &str {
    match status_pattern().find(title) {
        Some(m) => title[m.end()..].trim(),
        None => title.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-09-12 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn status_from_bracketed_prefix() {
        assert_eq!(status_from_title("[모집중] 건강한 성인 대상"), Some("모집중"));
        assert_eq!(status_from_title("(승인완료) 제목"), Some("승인완료"));
        assert_eq!(status_from_title("【종료】 제목"), Some("종료"));
        assert_eq!(status_from_title("모집완료 - 제목"), Some("모집완료"));
    }

    #[test]
    fn status_prefix_is_stripped() {
        assert_eq!(strip_status_prefix("[모집중] 건강한 성인 대상"), "건강한 성인 대상");
        assert_eq!(strip_status_prefix("  종료 - 제목 "), "제목");
        assert_eq!(strip_status_prefix("제목 [모집중]"), "제목 [모집중]");
    }

    #[test]
    fn no_status_without_prefix() {
        assert_eq!(status_from_title("건강한 성인 대상 모집중"), None);
        assert_eq!(status_from_title(""), None);
    }

    #[test]
    fn new_record_derives_status_and_keeps_title() {
        let rec = Record::new(Identifier::new(202500051), "[모집중] 제목", at());
        assert_eq!(rec.status, "모집중");
        assert_eq!(rec.title, "[모집중] 제목");
        assert_eq!(rec.year(), 2025);
        assert!(rec.fields.is_empty());
    }
}
