//! Institution panel harvesting.
//!
//! The facilities running a trial sit in a secondary tab of the detail page,
//! as one or more tables whose rows read `name | contact | extra...`.

use std::collections::HashSet;

use trialregistry_site::{rendered_text, squash_whitespace, Document, ElementRef, PageFetcher, Scope};

use crate::record::InstitutionEntry;

/// Tab label and caption keyword of the institution panel.
pub const INSTITUTION_LABEL: &str = "실시기관";

pub const DEFAULT_MAX_ENTRIES: usize = 30;

#[derive(Debug, Clone)]
pub struct InstitutionExtractor {
    tab_label: String,
    /// Panels forced visible when the tab cannot be activated.
    reveal_selectors: Vec<String>,
    /// Containers scanned for tables, in order.
    panel_selectors: Vec<String>,
    caption_keyword: String,
    max_entries: usize,
}

impl Default for InstitutionExtractor {
    fn default() -> Self {
        Self {
            tab_label: INSTITUTION_LABEL.to_string(),
            reveal_selectors: vec!["#tab2".to_string(), "#tab02".to_string()],
            panel_selectors: vec![
                "#tab2".to_string(),
                "#tab02".to_string(),
                "section.institution, .institution, .org-list".to_string(),
            ],
            caption_keyword: INSTITUTION_LABEL.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl InstitutionExtractor {
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Opens the institution tab, falling back to forcing its panel visible.
    /// Returns whether either step found something to show.
    pub async fn reveal<F: PageFetcher>(&self, fetcher: &mut F) -> bool {
        match fetcher.activate(&self.tab_label).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => tracing::debug!("Institution tab activation failed: {}", e),
        }
        self.reveal_selectors
            .iter()
            .any(|selector| fetcher.force_visible(selector))
    }

    /// Collects up to `max_entries` rows across every panel container. When
    /// the panels yield nothing, tables captioned with the institution
    /// keyword are scanned instead.
    pub fn harvest(&self, doc: &Document) -> Vec<InstitutionEntry> {
        let mut entries = Vec::new();
        if self.max_entries == 0 {
            return entries;
        }

        let mut seen = HashSet::new();
        'containers: for selector in &self.panel_selectors {
            for container in doc.select_all(selector) {
                if !seen.insert(container.id()) {
                    continue;
                }
                for table in container.select_all("table") {
                    if self.scan_table(table, &mut entries) {
                        break 'containers;
                    }
                }
            }
        }

        if entries.is_empty() {
            for table in doc.select_all("table") {
                let caption = table
                    .select_first("caption")
                    .map(rendered_text)
                    .unwrap_or_default();
                if caption.contains(&self.caption_keyword) && self.scan_table(table, &mut entries) {
                    break;
                }
            }
        }

        entries
    }

    /// Appends the table's rows; returns `true` once the cap is reached.
    fn scan_table(&self, table: ElementRef<'_>, entries: &mut Vec<InstitutionEntry>) -> bool {
        let mut rows = table.select_all("tbody tr");
        if rows.is_empty() {
            rows = table.select_all("tr");
        }
        for row in rows {
            let cols: Vec<String> = row.select_all("td").into_iter().map(cell_text).collect();
            let Some(name) = cols.first().filter(|name| !name.is_empty()) else {
                continue;
            };
            let contact = cols.get(1).filter(|c| !c.is_empty()).cloned();
            let extra: Vec<&str> = cols
                .iter()
                .skip(2)
                .map(String::as_str)
                .filter(|c| !c.is_empty())
                .collect();
            entries.push(InstitutionEntry {
                name: name.clone(),
                contact,
                extra: (!extra.is_empty()).then(|| extra.join(" | ")),
            });
            if entries.len() >= self.max_entries {
                return true;
            }
        }
        false
    }
}

fn cell_text(el: ElementRef<'_>) -> String {
    squash_whitespace(&rendered_text(el))
}
