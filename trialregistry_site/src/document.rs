//! Parsed page model and selector-candidate lookup.
//!
//! Selectors are given as CSS strings. An invalid selector never fails the
//! caller: it simply matches nothing, so a list of template candidates can
//! mix selectors written for several site layouts.

use scraper::{ElementRef, Html, Node, Selector};

/// Elements rendered on their own line by a browser.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot",
    "th", "thead", "tr", "ul",
];

/// Elements whose text is never rendered.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// A rendered detail page.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// The `<html>` element.
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    pub fn select_all(&self, selector: &str) -> Vec<ElementRef<'_>> {
        self.root().select_all(selector)
    }

    pub fn select_first(&self, selector: &str) -> Option<ElementRef<'_>> {
        self.root().select_first(selector)
    }

    /// First element matched by the first candidate selector that matches
    /// anything.
    pub fn find_first(&self, candidates: &[&str]) -> Option<ElementRef<'_>> {
        self.root().find_first(candidates)
    }

    /// Whether `<body>` carries any element or visible text.
    pub fn has_body_content(&self) -> bool {
        let Some(body) = self.select_first("body") else {
            return false;
        };
        body.children().any(|child| match child.value() {
            Node::Element(_) => true,
            Node::Text(text) => !text.trim().is_empty(),
            _ => false,
        })
    }
}

/// Selector lookups relative to an element.
pub trait Scope<'a> {
    fn select_all(&self, selector: &str) -> Vec<ElementRef<'a>>;

    fn select_first(&self, selector: &str) -> Option<ElementRef<'a>> {
        self.select_all(selector).into_iter().next()
    }

    fn find_first(&self, candidates: &[&str]) -> Option<ElementRef<'a>> {
        candidates
            .iter()
            .find_map(|candidate| self.select_first(candidate))
    }
}

impl<'a> Scope<'a> for ElementRef<'a> {
    fn select_all(&self, selector: &str) -> Vec<ElementRef<'a>> {
        match Selector::parse(selector) {
            Ok(parsed) => self.select(&parsed).collect(),
            Err(e) => {
                tracing::debug!("Skipping unparsable selector {:?}: {:?}", selector, e);
                Vec::new()
            }
        }
    }
}

/// Text of `el` as a browser would lay it out: block elements and `<br>`
/// start new lines, runs of whitespace inside a line collapse to one space,
/// blank lines are dropped.
pub fn rendered_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_rendered(el, &mut raw);
    raw.lines()
        .map(squash_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_rendered(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let name = element.name();
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    push_rendered(child_el, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapses every whitespace run (line breaks included) to a single space
/// and trims both ends.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
