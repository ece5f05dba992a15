// Human-readable names for pages and link targets

use crate::dom::{Anchor, Document, Region};
use nexus_core::ScanData;
use regex::Regex;
use std::sync::LazyLock;

pub const UNTITLED_PAGE: &str = "Untitled Page";
pub const UNTITLED: &str = "Untitled";
pub const DATABASE: &str = "Database";
pub const PREVIOUS_PAGE: &str = "Previous Page";

const SEPARATORS: [char; 5] = ['|', '·', '•', '-', '_'];

static TRAILING_LATIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[A-Za-z0-9\s]+$").unwrap());

/// Best-effort cleanup: keep the part before the first separator, then drop a
/// trailing run of Latin letters/digits (mixed-script metadata). Falls back
/// to the trimmed input when nothing is left. Lossy on purely Latin titles.
pub fn clean_name(raw: &str) -> String {
    let first = match raw.split(SEPARATORS).next() {
        Some(part) if !part.is_empty() => part,
        _ => raw,
    };
    let cleaned = TRAILING_LATIN.replace(first, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        raw.trim().to_string()
    } else {
        cleaned.to_string()
    }
}

/// Page and link title resolution for one workspace flavour.
#[derive(Debug, Clone)]
pub struct TitleResolver {
    site_suffixes: Vec<String>,
    site_name: String,
}

impl TitleResolver {
    pub fn new(site_suffixes: Vec<String>, site_name: impl Into<String>) -> Self {
        Self {
            site_suffixes,
            site_name: site_name.into(),
        }
    }

    /// Document title with each site suffix removed once.
    pub fn strip_suffix(&self, title: &str) -> String {
        let mut title = title.to_string();
        for suffix in &self.site_suffixes {
            if !suffix.is_empty() {
                title = title.replacen(suffix.as_str(), "", 1);
            }
        }
        title.trim().to_string()
    }

    /// Empty strings, the bare site name and the fallback names carry no
    /// information about the page.
    pub fn is_placeholder(&self, name: &str) -> bool {
        let name = name.trim();
        name.is_empty()
            || name == self.site_name
            || [UNTITLED_PAGE, UNTITLED, DATABASE, PREVIOUS_PAGE].contains(&name)
    }

    /// Name to record for `url`: the observed name, unless it is a
    /// placeholder and the page is already known under a real one.
    pub fn settle_name(&self, data: &ScanData, url: &str, observed: &str) -> String {
        match data.pages.get(url) {
            Some(page) if self.is_placeholder(observed) => page.name.clone(),
            _ => observed.to_string(),
        }
    }

    fn accept(&self, candidate: Option<String>) -> Option<String> {
        candidate
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && *c != self.site_name)
    }

    /// Name of the page the document shows: document title, main-region
    /// heading, any heading, title-marked element, then `og:title`.
    pub fn page_title(&self, doc: &Document) -> String {
        let found = self
            .accept(doc.title().map(|t| self.strip_suffix(&t)))
            .or_else(|| self.accept(doc.first_text(Region::Main, "h1")))
            .or_else(|| self.accept(doc.first_text(Region::Document, "h1")))
            .or_else(|| {
                self.accept(doc.first_text(
                    Region::Document,
                    ".notion-page-title, [data-content-editable-root], [class*=\"title\"]",
                ))
            })
            .or_else(|| self.accept(doc.meta_content("meta[property=\"og:title\"]")));

        match found {
            Some(title) => clean_name(&title),
            None => UNTITLED_PAGE.to_string(),
        }
    }
}

/// Name of a link target: anchor text, then the title inside its row/card,
/// then `aria-label`/`title`, else "Untitled".
pub fn link_name(anchor: &Anchor) -> String {
    let raw = [
        Some(anchor.text.clone()),
        anchor.row_title.clone(),
        anchor.aria_label.clone(),
        anchor.title.clone(),
    ]
    .into_iter()
    .flatten()
    .map(|s| s.trim().to_string())
    .find(|s| !s.is_empty());

    match raw {
        Some(name) => clean_name(&name),
        None => UNTITLED.to_string(),
    }
}
