//! Field extraction templates.
//!
//! Detail pages from different site generations expose the same facts as
//! grouped label/value blocks, `th`/`td` table rows, or definition lists.
//! Every template runs against the page and writes each pair it finds into
//! one shared map, so a later template overwrites a key an earlier one set
//! (last write wins). Templates are ordered so the most stable layout runs
//! first and the most specific one runs last.

use trialregistry_site::{rendered_text, squash_whitespace, Document, ElementRef, Scope};

use crate::record::FieldMap;

/// Page label of the title field. It is owned by title selection and never
/// written by a template.
pub const TITLE_LABEL: &str = "임상시험명";

/// Reserved record key for the title.
pub const TITLE_KEY: &str = "Title";

/// Raised by a template that cannot run against a page. The extractor logs
/// it and moves on to the next template.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{template} template failed: {reason}")]
pub struct TemplateError {
    pub template: &'static str,
    pub reason: String,
}

/// One structural assumption about where label/value pairs live.
pub trait FieldTemplate {
    fn name(&self) -> &'static str;

    /// Collects every label/value pair the template recognises, in page order.
    fn pairs(&self, doc: &Document) -> Result<Vec<(String, String)>, TemplateError>;
}

/// `div.txt-group` style blocks holding a label element and a value element.
#[derive(Debug, Clone)]
pub struct LabelValueGroups {
    pub group_selectors: Vec<String>,
    pub label_selectors: Vec<String>,
    pub value_selectors: Vec<String>,
}

impl Default for LabelValueGroups {
    fn default() -> Self {
        Self {
            group_selectors: strings(&[
                "div.recruit-detail div.txt-group",
                "div.txt-group",
                "section.detail .txt-group",
            ]),
            label_selectors: strings(&[".tit", ".title", "strong", "b", "h4", "h5"]),
            value_selectors: strings(&[".txt", ".desc", ".cont", "p", "div"]),
        }
    }
}

impl FieldTemplate for LabelValueGroups {
    fn name(&self) -> &'static str {
        "label-value groups"
    }

    fn pairs(&self, doc: &Document) -> Result<Vec<(String, String)>, TemplateError> {
        let labels: Vec<&str> = self.label_selectors.iter().map(String::as_str).collect();
        let values: Vec<&str> = self.value_selectors.iter().map(String::as_str).collect();
        let mut out = Vec::new();
        for selector in &self.group_selectors {
            for group in doc.select_all(selector) {
                let key = group.find_first(&labels).map(text_of).unwrap_or_default();
                let value = group.find_first(&values).map(text_of).unwrap_or_default();
                out.push((key, value));
            }
        }
        Ok(out)
    }
}

/// Table rows pairing the n-th `th` with the n-th `td`.
#[derive(Debug, Clone)]
pub struct RowTables {
    pub table_selectors: Vec<String>,
}

impl Default for RowTables {
    fn default() -> Self {
        Self {
            table_selectors: strings(&[
                "table.view, table.tbl-view, table.tbl, table.table, .view table, .tbl table",
                "div.recruit-detail table",
                "table",
            ]),
        }
    }
}

impl FieldTemplate for RowTables {
    fn name(&self) -> &'static str {
        "row tables"
    }

    fn pairs(&self, doc: &Document) -> Result<Vec<(String, String)>, TemplateError> {
        let mut out = Vec::new();
        for selector in &self.table_selectors {
            for table in doc.select_all(selector) {
                for row in table.select_all("tr") {
                    let headers = row.select_all("th");
                    let cells = row.select_all("td");
                    out.extend(
                        headers
                            .into_iter()
                            .zip(cells)
                            .map(|(th, td)| (text_of(th), text_of(td))),
                    );
                }
            }
        }
        Ok(out)
    }
}

/// `dl` lists pairing the n-th `dt` with the n-th `dd`.
#[derive(Debug, Clone)]
pub struct DefinitionLists {
    pub list_selectors: Vec<String>,
}

impl Default for DefinitionLists {
    fn default() -> Self {
        Self {
            list_selectors: strings(&["dl.view, dl.list, dl.info, .view dl, .info dl, dl"]),
        }
    }
}

impl FieldTemplate for DefinitionLists {
    fn name(&self) -> &'static str {
        "definition lists"
    }

    fn pairs(&self, doc: &Document) -> Result<Vec<(String, String)>, TemplateError> {
        let mut out = Vec::new();
        for selector in &self.list_selectors {
            for list in doc.select_all(selector) {
                let terms = list.select_all("dt");
                let defs = list.select_all("dd");
                out.extend(
                    terms
                        .into_iter()
                        .zip(defs)
                        .map(|(dt, dd)| (text_of(dt), text_of(dd))),
                );
            }
        }
        Ok(out)
    }
}

/// Ordered template list folded into a single field map.
pub struct FieldExtractor {
    templates: Vec<Box<dyn FieldTemplate + Send + Sync>>,
    reserved: Vec<String>,
}

impl Default for FieldExtractor {
    /// Label/value groups, then row tables, then definition lists.
    fn default() -> Self {
        Self::new(vec![
            Box::new(LabelValueGroups::default()),
            Box::new(RowTables::default()),
            Box::new(DefinitionLists::default()),
        ])
    }
}

impl FieldExtractor {
    pub fn new(templates: Vec<Box<dyn FieldTemplate + Send + Sync>>) -> Self {
        Self {
            templates,
            reserved: vec![TITLE_LABEL.to_string(), TITLE_KEY.to_string()],
        }
    }

    pub fn template_names(&self) -> Vec<&'static str> {
        self.templates.iter().map(|t| t.name()).collect()
    }

    /// Runs every template in order. Pairs with an empty label or value and
    /// pairs naming a reserved key are dropped; a failing template is
    /// skipped.
    pub fn extract(&self, doc: &Document) -> FieldMap {
        self.templates
            .iter()
            .fold(FieldMap::new(), |mut fields, template| {
                match template.pairs(doc) {
                    Ok(pairs) => {
                        for (key, value) in pairs {
                            if self.accepts(&key, &value) {
                                fields.insert(key, value);
                            }
                        }
                    }
                    Err(e) => tracing::debug!("{}", e),
                }
                fields
            })
    }

    fn accepts(&self, key: &str, value: &str) -> bool {
        !key.is_empty() && !value.is_empty() && !self.reserved.iter().any(|r| r == key)
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    squash_whitespace(&rendered_text(el))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_value_groups_pair_label_and_value() {
        let doc = Document::parse(
            r#"<html><body><div class="recruit-detail">
              <div class="txt-group"><span class="tit">임상시험 의뢰자</span><span class="txt">한국제약(주)</span></div>
              <div class="txt-group"><span class="tit">임상시험 단계</span><span class="txt">1상</span></div>
            </div></body></html>"#,
        );
        let fields = FieldExtractor::default().extract(&doc);
        assert_eq!(fields.get("임상시험 의뢰자").map(String::as_str), Some("한국제약(주)"));
        assert_eq!(fields.get("임상시험 단계").map(String::as_str), Some("1상"));
    }

    #[test]
    fn tables_pair_headers_with_cells() {
        let doc = Document::parse(
            r#"<html><body><table class="view">
              <tr><th>성별</th><td>남, 여</td><th>나이</th><td>19세 ~ 45세</td></tr>
              <tr><th>목표 대상자 수(국내)</th><td>40 명</td></tr>
              <tr><th>빈 값</th><td> </td></tr>
            </table></body></html>"#,
        );
        let fields = FieldExtractor::default().extract(&doc);
        assert_eq!(fields.get("성별").map(String::as_str), Some("남, 여"));
        assert_eq!(fields.get("나이").map(String::as_str), Some("19세 ~ 45세"));
        assert_eq!(fields.get("목표 대상자 수(국내)").map(String::as_str), Some("40 명"));
        assert!(!fields.contains_key("빈 값"));
    }

    #[test]
    fn definition_lists_pair_terms() {
        let doc = Document::parse(
            r#"<html><body><dl class="info"><dt>임상시험 승인일자</dt><dd>2025-01-02</dd>
              <dt>최근 변경일자</dt><dd>2025-03-04</dd></dl></body></html>"#,
        );
        let fields = FieldExtractor::default().extract(&doc);
        assert_eq!(fields.get("임상시험 승인일자").map(String::as_str), Some("2025-01-02"));
        assert_eq!(fields.get("최근 변경일자").map(String::as_str), Some("2025-03-04"));
    }

    #[test]
    fn later_template_overwrites_earlier_value() {
        let doc = Document::parse(
            r#"<html><body>
              <div class="txt-group"><strong>임상시험 단계</strong><p>단계 미상</p></div>
              <dl><dt>임상시험 단계</dt><dd>2상</dd></dl>
            </body></html>"#,
        );
        let fields = FieldExtractor::default().extract(&doc);
        assert_eq!(fields.get("임상시험 단계").map(String::as_str), Some("2상"));
    }

    #[test]
    fn title_label_is_never_written() {
        let doc = Document::parse(
            r#"<html><body><table><tr><th>임상시험명</th><td>표에서 읽은 제목</td></tr>
              <tr><th>Title</th><td>x</td></tr></table></body></html>"#,
        );
        let fields = FieldExtractor::default().extract(&doc);
        assert!(!fields.contains_key(TITLE_LABEL));
        assert!(!fields.contains_key(TITLE_KEY));
    }

    struct Broken;

    impl FieldTemplate for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn pairs(&self, _doc: &Document) -> Result<Vec<(String, String)>, TemplateError> {
            Err(TemplateError {
                template: "broken",
                reason: "layout mismatch".into(),
            })
        }
    }

    #[test]
    fn failing_template_is_skipped() {
        let extractor = FieldExtractor::new(vec![
            Box::new(Broken),
            Box::new(DefinitionLists::default()),
        ]);
        let doc = Document::parse("<html><body><dl><dt>성별</dt><dd>여</dd></dl></body></html>");
        let fields = extractor.extract(&doc);
        assert_eq!(fields.len(), 1);
        assert_eq!(extractor.template_names(), vec!["broken", "definition lists"]);
    }

    #[test]
    fn template_error_names_the_template() {
        let err = Broken.pairs(&Document::parse("")).unwrap_err();
        assert_eq!(err.to_string(), "broken template failed: layout mismatch");
    }

    #[test]
    fn page_without_pairs_yields_empty_map() {
        let doc = Document::parse("<html><body><p>내용 없음</p></body></html>");
        assert!(FieldExtractor::default().extract(&doc).is_empty());
    }
}
