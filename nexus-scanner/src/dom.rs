// DOM snapshots and the query primitives the sweeps rely on
//
// `scraper::Html` is not `Send`, so a `Document` is always built, queried and
// dropped inside one synchronous block. Anything that has to outlive the
// snapshot is copied out into plain structs such as `Anchor`.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

const SIDEBAR_SELECTORS: &[&str] = &[
    ".notion-sidebar",
    "nav[role=\"navigation\"]",
    "nav",
    "[data-testid=\"sidebar\"]",
    ".notion-sidebar-container",
];

const MAIN_SELECTORS: &[&str] = &[
    ".notion-page-content",
    "main",
    "[role=\"main\"]",
    ".notion-page-view",
    "article",
];

const DATA_VIEW_SELECTORS: &[&str] = &[
    ".notion-table-view",
    ".notion-board-view",
    ".notion-gallery-view",
    ".notion-list-view",
    "[data-block-id]",
];

static SIDEBAR: LazyLock<Vec<Selector>> = LazyLock::new(|| parse_all(SIDEBAR_SELECTORS));
static MAIN: LazyLock<Vec<Selector>> = LazyLock::new(|| parse_all(MAIN_SELECTORS));
static DATA_VIEW: LazyLock<Vec<Selector>> = LazyLock::new(|| parse_all(DATA_VIEW_SELECTORS));

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "[role=\"row\"], .notion-table-row, .notion-board-item, .notion-gallery-item, .notion-list-item",
    )
    .unwrap()
});
static ROW_TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-content-editable-root], .notion-page-title, h1, h2, h3, [class*=\"title\"]")
        .unwrap()
});

fn parse_all(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .collect()
}

/// Named containers located by trying a fixed selector chain in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Document,
    Sidebar,
    Main,
    DataView,
}

impl Region {
    fn chain(self) -> Option<(&'static [&'static str], &'static [Selector])> {
        match self {
            Region::Document => None,
            Region::Sidebar => Some((SIDEBAR_SELECTORS, SIDEBAR.as_slice())),
            Region::Main => Some((MAIN_SELECTORS, MAIN.as_slice())),
            Region::DataView => Some((DATA_VIEW_SELECTORS, DATA_VIEW.as_slice())),
        }
    }
}

/// An `<a href>` copied out of a snapshot, with everything the name
/// fallback chain may need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Anchor {
    pub href: String,
    pub text: String,
    pub aria_label: Option<String>,
    pub title: Option<String>,
    /// Text of the title-like element inside the closest row/card ancestor.
    pub row_title: Option<String>,
}

impl Anchor {
    pub fn bare(href: &str) -> Self {
        Self {
            href: href.to_string(),
            ..Self::default()
        }
    }
}

/// A parsed page together with the location it was rendered at.
pub struct Document {
    html: Html,
    location: String,
    base: Option<Url>,
}

impl Document {
    pub fn parse(location: &str, html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
            location: location.to_string(),
            base: Url::parse(location).ok(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Base for resolving relative hrefs; `None` when the location is not an
    /// absolute URL.
    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Path component of the location, like `location.pathname`.
    pub fn pathname(&self) -> String {
        match &self.base {
            Some(url) => url.path().to_string(),
            None => crate::link::strip_query(&self.location).to_string(),
        }
    }

    /// Raw `<title>` text.
    pub fn title(&self) -> Option<String> {
        self.html
            .select(&TITLE)
            .next()
            .map(|el| inner_text(&el))
            .filter(|t| !t.is_empty())
    }

    fn region(&self, region: Region) -> Option<(&'static str, ElementRef<'_>)> {
        let (css, selectors) = region.chain()?;
        css.iter()
            .zip(selectors)
            .find_map(|(css, selector)| self.html.select(selector).next().map(|el| (*css, el)))
    }

    pub fn has_region(&self, region: Region) -> bool {
        match region {
            Region::Document => true,
            _ => self.region(region).is_some(),
        }
    }

    /// The selector from the region's chain that matched, for handing to the
    /// browser (e.g. to scroll the container).
    pub fn region_selector(&self, region: Region) -> Option<&'static str> {
        self.region(region).map(|(css, _)| css)
    }

    /// All anchors inside the region, in document order. Empty when the
    /// region is absent.
    pub fn anchors(&self, region: Region) -> Vec<Anchor> {
        match region {
            Region::Document => self.html.select(&ANCHOR).map(|el| anchor_of(&el)).collect(),
            _ => match self.region(region) {
                Some((_, container)) => container
                    .select(&ANCHOR)
                    .map(|el| anchor_of(&el))
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    /// First anchor whose raw `href` attribute equals `href`.
    pub fn find_anchor(&self, href: &str) -> Option<Anchor> {
        self.html
            .select(&ANCHOR)
            .find(|el| el.value().attr("href") == Some(href))
            .map(|el| anchor_of(&el))
    }

    /// Inner text of the first element matching `css`, searched within the
    /// region (or the whole document).
    pub fn first_text(&self, region: Region, css: &str) -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        let found = match region {
            Region::Document => self.html.select(&selector).next(),
            _ => self.region(region)?.1.select(&selector).next(),
        };
        found.map(|el| inner_text(&el)).filter(|t| !t.is_empty())
    }

    /// `content` attribute of the first element matching `css`.
    pub fn attr(&self, css: &str, name: &str) -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        self.html
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr(name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn meta_content(&self, css: &str) -> Option<String> {
        self.attr(css, "content")
    }
}

/// Text content with whitespace runs collapsed, close to what `innerText`
/// yields for inline elements.
fn inner_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty_attr(el: &ElementRef<'_>, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn closest<'a>(el: &ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    std::iter::once(*el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .find(|candidate| selector.matches(candidate))
}

fn anchor_of(el: &ElementRef<'_>) -> Anchor {
    let row_title = closest(el, &ROW)
        .and_then(|row| row.select(&ROW_TITLE).next())
        .map(|title| inner_text(&title))
        .filter(|t| !t.is_empty());

    Anchor {
        href: el.value().attr("href").unwrap_or_default().to_string(),
        text: inner_text(el),
        aria_label: non_empty_attr(el, "aria-label"),
        title: non_empty_attr(el, "title"),
        row_title,
    }
}
