//! Existence oracle for probed identifiers.
//!
//! The registry answers every identifier with some page; whether a record
//! stands behind it is decided solely from the text found in the title
//! region. A missing identifier renders the site layout, so its "title" is
//! either empty, a dump of navigation labels, or a whole content block.

use trialregistry_site::{rendered_text, squash_whitespace, Document};

/// Navigation and section labels that leak into the title region when an
/// identifier has no record behind it.
pub const GARBAGE_KEYWORDS: &[&str] = &[
    "임상시험 정보",
    "식약처 승인 목록",
    "목록으로",
    "의약품 정보",
    "실시기관 정보",
    "대상자 선정기준",
    "대상자 제외기준",
    "연구설계 및 수행방법",
    "최초 사람대상 연구여부",
];

/// Title region candidates, newest layout first.
pub const TITLE_SELECTORS: &[&str] = &[
    "div.recruit-group2 > div.box",
    "div.recruit-group2 .box .tit, div.recruit-group2 .box .title",
    "div.recruit-detail h3",
    "div.view-tit, .view-tit, .view_title",
    "h2.tit, h3.tit, h1.tit",
    "div.recruit-detail, #contents, .contents, .container",
];

/// Above this many characters a multi-line candidate is cut to its first line.
pub const TITLE_FIRST_LINE_THRESHOLD: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Real,
    Absent,
}

/// Decides whether title-region text belongs to a real record.
pub trait Classifier {
    fn classify(&self, title: &str) -> Verdict;
}

impl<F> Classifier for F
where
    F: Fn(&str) -> Verdict,
{
    fn classify(&self, title: &str) -> Verdict {
        self(title)
    }
}

/// Keyword and length heuristic: a title is garbage when it is empty, names
/// at least `min_keyword_hits` navigation labels, or runs longer than
/// `max_chars` characters.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    keywords: Vec<String>,
    min_keyword_hits: usize,
    max_chars: usize,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self {
            keywords: GARBAGE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            min_keyword_hits: 2,
            max_chars: 300,
        }
    }
}

impl HeuristicClassifier {
    pub fn new(keywords: Vec<String>, min_keyword_hits: usize, max_chars: usize) -> Self {
        Self {
            keywords,
            min_keyword_hits,
            max_chars,
        }
    }

    pub fn looks_garbage(&self, text: &str) -> bool {
        let normalized = text.replace(',', " ");
        let normalized = normalized.trim();
        if normalized.is_empty() {
            return true;
        }
        let hits = self
            .keywords
            .iter()
            .filter(|k| normalized.contains(k.as_str()))
            .count();
        hits >= self.min_keyword_hits || normalized.chars().count() > self.max_chars
    }
}

impl Classifier for HeuristicClassifier {
    fn classify(&self, title: &str) -> Verdict {
        if self.looks_garbage(title) {
            Verdict::Absent
        } else {
            Verdict::Real
        }
    }
}

/// Reduces rendered candidate text to a title. Long multi-line text is a
/// captured content block, so only its first line is kept; everything else
/// is flattened onto one line.
pub fn trim_title_candidate(text: &str) -> String {
    if text.chars().count() > TITLE_FIRST_LINE_THRESHOLD && text.contains('\n') {
        if let Some(first) = text.split('\n').next().map(str::trim) {
            if !first.is_empty() {
                return squash_whitespace(first);
            }
        }
    }
    squash_whitespace(text)
}

/// Text of the first title candidate that renders non-empty, or an empty
/// string when no candidate does.
pub fn select_title(doc: &Document, candidates: &[&str]) -> String {
    for selector in candidates {
        let Some(el) = doc.select_first(selector) else {
            continue;
        };
        let text = rendered_text(el);
        if !text.trim().is_empty() {
            return trim_title_candidate(&text);
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_title_is_absent() {
        let c = HeuristicClassifier::default();
        assert_eq!(c.classify(""), Verdict::Absent);
        assert_eq!(c.classify("   "), Verdict::Absent);
        assert_eq!(c.classify(",,"), Verdict::Absent);
    }

    #[test]
    fn two_navigation_labels_are_absent() {
        let c = HeuristicClassifier::default();
        assert_eq!(c.classify("임상시험 정보 식약처 승인 목록"), Verdict::Absent);
        assert_eq!(c.classify("목록으로,의약품 정보"), Verdict::Absent);
    }

    #[test]
    fn single_navigation_label_is_tolerated() {
        let c = HeuristicClassifier::default();
        assert_eq!(
            c.classify("의약품 정보 제공 동의 환자 대상 2상 임상시험"),
            Verdict::Real
        );
    }

    #[test]
    fn clean_short_title_is_real() {
        let c = HeuristicClassifier::default();
        assert_eq!(
            c.classify("[모집중] 건강한 성인 자원자를 대상으로 한 1상 임상시험"),
            Verdict::Real
        );
    }

    #[test]
    fn length_ceiling_counts_characters() {
        let c = HeuristicClassifier::default();
        assert_eq!(c.classify(&"가".repeat(300)), Verdict::Real);
        assert_eq!(c.classify(&"가".repeat(301)), Verdict::Absent);
    }

    #[test]
    fn closures_are_classifiers() {
        let always_real = |_: &str| Verdict::Real;
        assert_eq!(always_real.classify(""), Verdict::Real);
    }

    #[test]
    fn long_multiline_candidate_keeps_first_line() {
        let first = "첫 줄 제목";
        let text = format!("{}\n{}", first, "x".repeat(600));
        assert_eq!(trim_title_candidate(&text), first);
    }

    #[test]
    fn short_multiline_candidate_is_flattened() {
        assert_eq!(trim_title_candidate("위\n아래"), "위 아래");
    }

    #[test]
    fn select_title_cuts_600_char_block_at_line_break() {
        let first = "A".repeat(250);
        let rest = "B".repeat(349);
        let html = format!(
            "<html><body><div class='view-tit'>{}<br>{}</div></body></html>",
            first, rest
        );
        let doc = Document::parse(&html);
        assert_eq!(select_title(&doc, TITLE_SELECTORS), first);
    }

    #[test]
    fn select_title_skips_empty_candidates() {
        let doc = Document::parse(
            "<html><body><div class='recruit-group2'><div class='box'> </div></div>\
             <div class='recruit-detail'><h3>실제 제목</h3></div></body></html>",
        );
        assert_eq!(select_title(&doc, TITLE_SELECTORS), "실제 제목");
    }

    #[test]
    fn select_title_without_candidates_is_empty() {
        let doc = Document::parse("<html><body><span>x</span></body></html>");
        assert_eq!(select_title(&doc, &["div.view-tit"]), "");
    }
}
